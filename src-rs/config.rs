use crate::gateway::{
    CommandGateway, EditGateway, GeminiGateway, DEFAULT_API_BASE, DEFAULT_IMAGE_MODEL,
    DEFAULT_VIDEO_MODEL,
};
use crate::util::out_root;
use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GatewayKind {
    Gemini,
    Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GatewayArgs {
    /// Backend: gemini (hosted API) or command (local program). Env: PHOTOFIX_GATEWAY
    #[arg(long, value_enum)]
    pub gateway: Option<GatewayKind>,
    /// Program for the command backend. Env: PHOTOFIX_GATEWAY_CMD
    #[arg(long)]
    pub gateway_cmd: Option<String>,
    /// Env: GEMINI_API_KEY or API_KEY
    #[arg(long)]
    pub api_key: Option<String>,
    #[arg(long)]
    pub api_base: Option<String>,
    /// Env: PHOTOFIX_IMAGE_MODEL
    #[arg(long)]
    pub image_model: Option<String>,
    /// Env: PHOTOFIX_VIDEO_MODEL
    #[arg(long)]
    pub video_model: Option<String>,
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 180)]
    pub request_timeout: u64,
    #[arg(long, default_value_t = 10)]
    pub video_poll: u64,
    /// Give up on a video job after this many seconds (default: wait forever).
    #[arg(long)]
    pub video_timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayConfig {
    Gemini {
        api_key: String,
        api_base: String,
        image_model: String,
        video_model: String,
        request_timeout: Duration,
        video_poll: Duration,
        video_timeout: Option<Duration>,
    },
    Command {
        bin: String,
        timeout: Duration,
    },
}

fn env_value(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl GatewayConfig {
    /// Flags win over environment variables.
    pub fn resolve(args: &GatewayArgs) -> Result<Self> {
        Self::resolve_with(args, env_value)
    }

    fn resolve_with(args: &GatewayArgs, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let kind = match args.gateway {
            Some(kind) => kind,
            None => match lookup("PHOTOFIX_GATEWAY").as_deref() {
                None | Some("gemini") => {
                    if args.gateway_cmd.is_some() {
                        GatewayKind::Command
                    } else {
                        GatewayKind::Gemini
                    }
                }
                Some("command") => GatewayKind::Command,
                Some(other) => bail!("PHOTOFIX_GATEWAY must be gemini or command, got {other}"),
            },
        };
        match kind {
            GatewayKind::Command => {
                let bin = args
                    .gateway_cmd
                    .clone()
                    .or_else(|| lookup("PHOTOFIX_GATEWAY_CMD"))
                    .context("command gateway needs --gateway-cmd or PHOTOFIX_GATEWAY_CMD")?;
                Ok(Self::Command {
                    bin,
                    timeout: Duration::from_secs(args.request_timeout.max(1)),
                })
            }
            GatewayKind::Gemini => {
                let api_key = args
                    .api_key
                    .clone()
                    .or_else(|| lookup("GEMINI_API_KEY"))
                    .or_else(|| lookup("API_KEY"))
                    .context("no API key: pass --api-key or set GEMINI_API_KEY / API_KEY")?;
                Ok(Self::Gemini {
                    api_key,
                    api_base: args
                        .api_base
                        .clone()
                        .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                    image_model: args
                        .image_model
                        .clone()
                        .or_else(|| lookup("PHOTOFIX_IMAGE_MODEL"))
                        .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
                    video_model: args
                        .video_model
                        .clone()
                        .or_else(|| lookup("PHOTOFIX_VIDEO_MODEL"))
                        .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string()),
                    request_timeout: Duration::from_secs(args.request_timeout.max(1)),
                    video_poll: Duration::from_secs(args.video_poll.max(1)),
                    video_timeout: args.video_timeout.map(Duration::from_secs),
                })
            }
        }
    }

    pub fn build(&self) -> Result<Box<dyn EditGateway>> {
        match self {
            Self::Gemini {
                api_key,
                api_base,
                image_model,
                video_model,
                request_timeout,
                video_poll,
                video_timeout,
            } => {
                let gw = GeminiGateway::new(api_key.clone(), *request_timeout)?
                    .with_api_base(api_base.clone())
                    .with_models(image_model.clone(), video_model.clone())
                    .with_video_polling(*video_poll, *video_timeout);
                Ok(Box::new(gw))
            }
            Self::Command { bin, timeout } => Ok(Box::new(CommandGateway::new(
                bin.clone(),
                *timeout,
                out_root().join("tmp"),
            ))),
        }
    }
}

/// `-v` → info, `-vv` → debug; PHOTOFIX_LOG overrides both.
pub fn log_filter(verbose: u8) -> String {
    if let Some(filter) = env_value("PHOTOFIX_LOG") {
        return filter;
    }
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
    .to_string()
}
