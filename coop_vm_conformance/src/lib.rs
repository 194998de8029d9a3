// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Black-box conformance tests for `coop_vm`.
//!
//! The tests live under `tests/` and only use the public API.
//!
//! Run with:
//! `cargo test -p coop_vm_conformance`

#![no_std]
