// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Named outputs of a run.

use crate::config::Layout;
use crate::error::Result;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Outputs {
    pub bucket_arn: String,
    /// Only exported for the release layout
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

impl Outputs {
    pub fn new(layout: Layout, bucket_arn: String, secret_name: String) -> Self {
        let secret_name = match layout {
            Layout::Release => Some(secret_name),
            Layout::Service => None,
        };
        Outputs {
            bucket_arn,
            secret_name,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
