// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

//! Container structures. These modules only split files into their
//! parts, the tag semantics live in [`crate::metadata`].

pub mod ciff;
pub mod iiq;
pub mod mrw;
pub mod raf;
pub mod tiff;
