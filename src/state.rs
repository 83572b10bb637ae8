// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::path::PathBuf;
use std::sync::Arc;

use crate::relay::RelaySubmitter;

#[derive(Clone)]
pub struct AppState {
    pub submitter: Arc<RelaySubmitter>,
    /// Directory of the relay database, checked by the readiness check.
    pub data_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(submitter: Arc<RelaySubmitter>) -> Self {
        Self {
            submitter,
            data_dir: None,
        }
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = Some(data_dir);
        self
    }
}
