// Copyright 2025 xalrpc Authors
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

//! # xalrpc CLI
//!
//! Command-line interface for hosting and calling xalrpc services.
//!
//! ## Key Commands
//!
//! - `xalrpc serve`: Host the demo `calc` and `echo` services
//! - `xalrpc call`: Invoke one remote method and print the result as JSON

pub mod demo;
