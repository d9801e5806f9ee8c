// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.


//! Provider clients for the generative text service.
//!
//! [`ApiClient`] is the seam the rest of the workspace talks to. A blocking
//! call returns one [`ProviderResponse`](llm_contracts::ProviderResponse), and a
//! streamed call returns a [`FragmentStream`] that the caller drains one text
//! fragment at a time.

pub mod client;
pub mod config;
pub mod gemini;

pub use client::{ApiClient, FragmentStream};
pub use config::GeminiConfig;
pub use gemini::GeminiClient;
