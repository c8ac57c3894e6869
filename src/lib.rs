// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
pub mod config;
pub mod constants;
pub mod declare;
pub mod deferred;
pub mod error;
pub mod kubernetes;
pub mod outputs;
pub mod policy;
pub mod provider;
pub mod stack;

#[cfg(test)]
pub mod test_utils;
