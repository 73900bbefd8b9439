#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum)]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,

    // requests a single client may make per window, 0 turns limiting off
    #[clap(long, env, default_value = "20")]
    pub rate_limit_max_requests: u32,

    #[clap(long, env, default_value = "60")]
    pub rate_limit_window_seconds: u64,

    // hard cap on how many client windows are held in memory
    #[clap(long, env, default_value = "100000")]
    pub rate_limit_max_clients: usize,

    // how often empty client windows get swept out
    #[clap(long, env, default_value = "60")]
    pub rate_limit_sweep_seconds: u64,

    // outbound fetch settings for the embed hosts
    #[clap(long, env, default_value = "15")]
    pub upstream_timeout_seconds: u64,

    #[clap(long, env, default_value = "5")]
    pub upstream_max_redirects: usize,
}

impl Default for AppConfig {
    // mirrors the clap defaults, used by tests and as a fallback
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            cors_origin: "*".to_string(),
            sentry_dsn: None,
            rate_limit_max_requests: 20,
            rate_limit_window_seconds: 60,
            rate_limit_max_clients: 100_000,
            rate_limit_sweep_seconds: 60,
            upstream_timeout_seconds: 15,
            upstream_max_redirects: 5,
        }
    }
}
