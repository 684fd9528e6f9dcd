/*
 * Argo Support - AI-assisted diagnostics for Argo CD deployments
 * Copyright (C) 2025 Argo Support team
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Support controller core library
//!
//! Reconciles `Support` resources: collects diagnostics for an unhealthy
//! deployment, asks the analysis service to explain them and records the
//! answer (plus end-user feedback) on the resource status.

pub mod analysis;
pub mod crds;
pub mod diagnostics;
pub mod prompt;
pub mod tasks;
pub mod workflows;

// Re-export commonly used types
pub use crds::{AuthProvider, Phase, Support, SupportSpec, SupportStatus};
pub use tasks::config::ControllerConfig;
pub use tasks::run_support_controller;
pub use workflows::{WorkflowRegistry, GENAI_WORKFLOW};
