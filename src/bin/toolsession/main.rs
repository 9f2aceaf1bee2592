//! ToolSession server entrypoint.
//!
//! Loads the tool table, optionally starts the default tool, then serves
//! JSON-lines requests on stdin until the client hangs up. Every session is
//! stopped before exit.

use anyhow::Result;
use std::sync::Arc;
use toolsession::ipc::run_ipc_mode;
use toolsession::telemetry::init_tracing;
use toolsession::{
    init_logging, install_panic_hook, log_debug, log_file_path, AppConfig, LifecyclePolicy,
    SessionRegistry,
};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;
    init_logging(&config);
    install_panic_hook();
    init_tracing(&config);
    log_debug("=== ToolSession Started ===");
    log_debug(&format!("Log file: {:?}", log_file_path()));

    let registry = Arc::new(SessionRegistry::from_config(&config)?);
    log_debug(&format!(
        "tools: {:?} (default '{}', lifecycle {})",
        registry.tool_names(),
        config.tool_name,
        config.lifecycle.label()
    ));

    if config.lifecycle == LifecyclePolicy::Persistent && !config.no_autostart {
        // Clients can still call start_session after a failed autostart.
        if let Err(err) = registry.start_session(None) {
            log_debug(&format!("autostart of '{}' failed: {err}", config.tool_name));
        }
    }

    let result = run_ipc_mode(Arc::clone(&registry));
    registry.shutdown();
    log_debug("=== ToolSession Exiting ===");
    result
}
