use clap::{Args, Parser};
use serde::Deserialize;

use codec_msgpack::MsgpackConfig;
use transport_tcp_server::TcpServerConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "record-sink", about = "Принимает одно TCP-соединение и печатает MessagePack-записи")]
pub struct Cli {
    #[command(flatten)]
    pub args: SinkArgs,
}

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Args, Clone, Debug)]
pub struct SinkArgs {
    /// Путь к TOML конфигу (если файла нет, берутся значения по умолчанию)
    #[arg(long, default_value = "record-sink.toml", env = "RECORD_SINK_CONFIG")]
    pub config: String,

    /// Адрес для bind (по умолчанию 0.0.0.0)
    #[arg(long, env = "RECORD_SINK_HOST")]
    pub host: Option<String>,

    /// TCP порт (по умолчанию 24224)
    #[arg(long, env = "RECORD_SINK_PORT")]
    pub port: Option<u16>,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SinkConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// 0 = без ограничения
    pub max_message_bytes: Option<usize>,
    pub poll_interval_ms: Option<u64>,
}

impl SinkConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| ServerError::Config { context: "parse", detail: format!("'{path}': {e}") })
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Итоговая конфигурация: defaults < config.toml < env/CLI.
#[derive(Debug)]
pub struct Effective {
    pub listen: TcpServerConfig,
    pub codec: MsgpackConfig,
}

impl Effective {
    pub fn new(args: &SinkArgs) -> Result<Self, ServerError> {
        let cfg = match SinkConfig::load(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&args.config).exists() {
                    return Err(e);
                }
                SinkConfig::default()
            }
        };
        Self::merge(args, cfg)
    }

    fn merge(args: &SinkArgs, cfg: SinkConfig) -> Result<Self, ServerError> {
        let defaults = TcpServerConfig::default();
        let listen = TcpServerConfig {
            host: args.host.clone().or(cfg.host).unwrap_or(defaults.host),
            port: args.port.or(cfg.port).unwrap_or(defaults.port),
            poll_interval_ms: cfg.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
        };
        listen
            .validate()
            .map_err(|e| ServerError::Config { context: "validate", detail: e.to_string() })?;

        Ok(Self {
            listen,
            codec: MsgpackConfig {
                max_message_bytes: cfg.max_message_bytes.unwrap_or(0),
            },
        })
    }
}
