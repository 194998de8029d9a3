// Copyright 2026 the Coop VM Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Benchmarks for the `coop_vm` interpreter.
//!
//! Run with:
//! `cargo bench -p coop_vm_wind_tunnel`

#![no_std]
