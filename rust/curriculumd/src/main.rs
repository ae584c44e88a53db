mod coverage;
mod db;
mod ipc;
mod logging;
mod model;
mod planning;
mod store;

use std::io::{self, BufRead, Write};

fn main() {
    let (log_config, warnings) = logging::LogConfig::from_env();
    if let Err(e) = logging::init_logging(&log_config) {
        eprintln!("curriculumd: logging disabled: {}", e);
    }
    for w in warnings {
        log::warn!("event=log_config_ignored reason={}", w);
    }

    let mut state = ipc::AppState::default();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                log::error!("event=stdin_read_failed error={}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                log::warn!("event=bad_json error={}", e);
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    log::info!("event=shutdown");
}
