// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Simple dotfile manager.
//!
//! Keeps configuration files of the home directory under version control in
//! a bare-alias [`store`], and offers a [`trace`] mode that discovers which
//! configuration files a program actually opens by watching its system
//! calls.

pub mod config;
pub mod path;
pub mod store;
pub mod trace;
