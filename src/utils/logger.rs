use chrono::Utc;
use log::info;
use std::io::Write;

pub struct EmpathyLogger;

impl EmpathyLogger {
    /// Installs the global logger. `RUST_LOG` wins over `default_level`.
    /// Calling it again once a logger is set does nothing.
    pub fn init(default_level: &str) {
        let env = env_logger::Env::default().default_filter_or(default_level);
        let result = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{}] [{}] [{}:{}] {}",
                    Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
                    record.level(),
                    record.file().unwrap_or("unknown"),
                    record.line().unwrap_or(0),
                    record.args()
                )
            })
            .try_init();

        if result.is_ok() {
            info!("Empathy logger initialized");
        }
    }
}
