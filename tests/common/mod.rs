#![allow(dead_code, unused_imports)]

pub use servant_test_utils::builders;
pub use servant_test_utils::{init_tracing, with_timeout};

use std::sync::Arc;

use servant::engine::Engine;
use servant::exec::CommandBuilder;

/// Engine running shell commands through `sh` from the temp directory.
pub fn test_engine() -> Arc<Engine> {
    Arc::new(Engine::new(CommandBuilder::new("sh", std::env::temp_dir())))
}
