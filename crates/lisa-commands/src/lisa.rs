//! `/lisa`: small talk backed by an external chat API.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Deserialize;

use lisa_core::{
    commands::{Command, CommandContext, CommandMeta},
    errors::Error,
    Result,
};

pub const RANDOM_REPLIES: [&str; 3] = ["Hey bby bolo", "Yes,iam Lisa !You bot😅", "bolo bby"];

pub const DECLINED_REPLY: &str =
    "I'm sorry, I couldn't process your request. Please try again later.";
pub const TIMEOUT_REPLY: &str =
    "The request timed out. The server may be busy; please try again later.";
pub const FAILURE_REPLY: &str = "Oops! Something went wrong. Please try again later.";

#[derive(Debug, thiserror::Error)]
pub enum LisaError {
    #[error("chat api timed out")]
    Timeout,
    #[error("chat api request failed: {0}")]
    Request(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LisaReply {
    Answer(String),
    /// The API answered but did not report success.
    Declined,
}

/// The chat API behind `/lisa`.
#[async_trait]
pub trait LisaBackend: Send + Sync {
    async fn ask(&self, text: &str) -> std::result::Result<LisaReply, LisaError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    answer: Option<String>,
}

/// `GET {url}?text=...` with a bounded timeout.
#[derive(Clone, Debug)]
pub struct HttpLisaBackend {
    url: String,
    http: reqwest::Client,
}

impl HttpLisaBackend {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;
        Ok(Self {
            url: url.to_string(),
            http,
        })
    }
}

fn map_reqwest(e: reqwest::Error) -> LisaError {
    if e.is_timeout() {
        LisaError::Timeout
    } else {
        LisaError::Request(e.to_string())
    }
}

#[async_trait]
impl LisaBackend for HttpLisaBackend {
    async fn ask(&self, text: &str) -> std::result::Result<LisaReply, LisaError> {
        let resp = self
            .http
            .get(&self.url)
            .query(&[("text", text)])
            .send()
            .await
            .map_err(map_reqwest)?;

        if !resp.status().is_success() {
            return Err(LisaError::Request(format!("status {}", resp.status())));
        }

        let body: ApiResponse = resp.json().await.map_err(map_reqwest)?;
        Ok(interpret(body))
    }
}

fn interpret(body: ApiResponse) -> LisaReply {
    match (body.status.as_deref(), body.answer) {
        (Some("success"), Some(answer)) if !answer.trim().is_empty() => LisaReply::Answer(answer),
        _ => LisaReply::Declined,
    }
}

pub struct LisaCommand {
    backend: Arc<dyn LisaBackend>,
}

impl LisaCommand {
    pub fn new(backend: Arc<dyn LisaBackend>) -> Self {
        Self { backend }
    }

    /// Text to send back for `args`; never fails.
    pub async fn respond(&self, args: &[String]) -> String {
        if args.is_empty() {
            return random_reply().to_string();
        }

        let question = args.join(" ");
        match self.backend.ask(&question).await {
            Ok(LisaReply::Answer(answer)) => answer,
            Ok(LisaReply::Declined) => DECLINED_REPLY.to_string(),
            Err(LisaError::Timeout) => {
                tracing::warn!("lisa chat api timed out");
                TIMEOUT_REPLY.to_string()
            }
            Err(e) => {
                tracing::error!("error in lisa command: {e}");
                FAILURE_REPLY.to_string()
            }
        }
    }
}

fn random_reply() -> &'static str {
    RANDOM_REPLIES
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(RANDOM_REPLIES[0])
}

#[async_trait]
impl Command for LisaCommand {
    fn meta(&self) -> CommandMeta {
        CommandMeta::new("lisa", "Fun", "Chat with Lisa AI")
            .guide("Use /lisa followed by your message to chat with Lisa AI")
    }

    async fn execute(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<()> {
        let text = self.respond(args).await;
        ctx.reply(&text).await
    }
}
