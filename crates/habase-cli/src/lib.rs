// Copyright 2025 habase Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # habase CLI
//!
//! Command-line client for a cluster of store servers.
//!
//! Every command goes through one [`habase_client::Connection`] built from
//! the shared flags, so calls fail over between `--server`s exactly as
//! library callers see it.
//!
//! ## Key Commands
//!
//! - `habase tables`: List tables (prefix stripped when `--prefix` is set)
//! - `habase call`: Dispatch a raw operation (outputs raw JSON for scripting)
//! - `habase watch`: Poll a table's state and log failover as it happens

pub mod watch;
