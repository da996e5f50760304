//! Assembles the collaborators from configuration and runs the streamer.

use std::future::IntoFuture;
use std::sync::Arc;

use chrono::Utc;
use anyhow::Context;
use gptuber_core::canned::{
    CannedBrain, CannedDistractor, ChatBuffer, MergedChat, MockAgent, PacedSpeaker,
};
use gptuber_core::collab::{Brain, ChatFeed, Distractor, SmartAgent, Speaker};
use gptuber_core::config::{Config, WarnLevel};
use gptuber_core::emotes::ExpressionTable;
use gptuber_core::report::{AnswerSlot, ReportBuilder};
use gptuber_core::scheduler::{Scheduler, SchedulerSettings};
use gptuber_core::timeline::TimelineSynthesizer;
use gptuber_core::tokenizer::MecabTokenizer;
use home_agent::AgentOptions;
use tokio::net::TcpListener;

use crate::agent::ProcessAgent;
use crate::command::{CommandBrain, CommandDistractor};
use crate::sink::BroadcastSink;
use crate::speaker::CommandSpeaker;
use crate::state::AppState;
use crate::youtube::YoutubeChat;

/// Command-line overrides on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct StreamFlags {
    /// Canned utterances and TV script instead of the generation commands.
    pub no_llm: bool,
    pub no_neural_tts: bool,
    /// Use the mock agent.
    pub no_smart_agent: bool,
    pub port: Option<u16>,
    /// YouTube live stream whose chat is read (overrides youtube.url).
    pub youtube_url: Option<String>,
}

/// Everything the streamer needs, wired but not yet running.
pub struct StreamRuntime {
    pub app: AppState,
    pub scheduler: Scheduler,
    reports: ReportBuilder,
    brain: Arc<dyn Brain>,
}

impl StreamRuntime {
    pub fn assemble(config: &Config, flags: &StreamFlags) -> Self {
        Self::assemble_with(config, flags, None)
    }

    /// Like [`StreamRuntime::assemble`], with a remote chat feed polled
    /// ahead of the local chat buffer.
    pub fn assemble_with(
        config: &Config,
        flags: &StreamFlags,
        remote_chat: Option<Arc<dyn ChatFeed>>,
    ) -> Self {
        for w in config.validate() {
            match w.level {
                WarnLevel::Error => tracing::error!("config: {}", w.message),
                WarnLevel::Warning => tracing::warn!("config: {}", w.message),
            }
        }

        let neural = config.speech.neural && !flags.no_neural_tts;

        let tokenizer = MecabTokenizer::from_argv(&config.timeline.mecab_command);
        let expressions = match &config.expressions.assets_dir {
            Some(dir) => ExpressionTable::with_assets(config.expressions.table.clone(), dir),
            None => ExpressionTable::new(config.expressions.table.clone()),
        };
        tracing::debug!(entries = expressions.len(), "expression table loaded");
        let synth = TimelineSynthesizer::new(Arc::new(tokenizer), Arc::new(expressions))
            .with_seconds_per_mora(config.timeline.seconds_per_mora);

        let speaker: Arc<dyn Speaker> = if config.speech.silent {
            Arc::new(PacedSpeaker::new(config.timeline.seconds_per_mora))
        } else {
            Arc::new(CommandSpeaker::new(config.speech.clone()))
        };

        let brain: Arc<dyn Brain> = match (&config.brain.command, flags.no_llm) {
            (Some(argv), false) if !argv.is_empty() => Arc::new(CommandBrain::new(argv.clone())),
            _ => Arc::new(CannedBrain::default()),
        };
        let distractor: Arc<dyn Distractor> = match (&config.distraction.command, flags.no_llm) {
            (Some(argv), false) if !argv.is_empty() => {
                Arc::new(CommandDistractor::new(argv.clone()))
            }
            _ => Arc::new(CannedDistractor::default()),
        };

        let agent: Option<Arc<dyn SmartAgent>> = if flags.no_smart_agent || config.agent.mock {
            Some(Arc::new(MockAgent::default()))
        } else if config.agent.enabled {
            AgentOptions::from_argv(&config.agent.command).map(|opts| {
                let opts = opts.with_timeout(std::time::Duration::from_secs(
                    config.agent.timeout_secs,
                ));
                Arc::new(ProcessAgent::new(opts)) as Arc<dyn SmartAgent>
            })
        } else {
            None
        };

        let mut settings = SchedulerSettings::from_config(config);
        settings.neural_speech = neural;

        let sink = BroadcastSink::new(256);
        let answers = AnswerSlot::new();
        let chat = Arc::new(ChatBuffer::new());

        let mut builder = Scheduler::builder(speaker)
            .settings(settings)
            .display(Arc::new(sink.clone()), synth)
            .answers(answers.clone());
        if let Some(agent) = agent {
            builder = builder.agent(agent);
        }
        let scheduler = builder.build();

        let feed: Arc<dyn ChatFeed> = match remote_chat {
            Some(remote) => Arc::new(MergedChat::new(vec![remote, chat.clone()])),
            None => chat.clone(),
        };
        let reports = ReportBuilder::new(feed, answers, Utc::now())
            .with_distractor(distractor)
            .with_boredom_patience(config.scheduler.boredom_patience_secs)
            .with_max_chat_chars(config.report.max_chat_chars);

        tracing::info!(
            neural,
            canned_brain = flags.no_llm || config.brain.command.is_none(),
            mock_agent = flags.no_smart_agent || config.agent.mock,
            "streamer assembled"
        );

        Self {
            app: AppState::new(scheduler.clone(), chat, &sink),
            scheduler,
            reports,
            brain,
        }
    }

    /// Serve the front end on `listener` and run the scheduler until the
    /// server stops.
    pub async fn run(self, listener: TcpListener) -> anyhow::Result<()> {
        let port = listener.local_addr()?.port();
        let router = crate::build_router(self.app.clone());
        tracing::info!("display server listening on ws://localhost:{port}/ws");

        let scheduler = self.scheduler.clone();
        tokio::select! {
            served = axum::serve(listener, router).into_future() => served?,
            _ = scheduler.run(self.reports, self.brain) => {}
        }
        Ok(())
    }
}

/// Resolve the YouTube live chat named by the flags or the config, if any.
pub async fn connect_youtube(
    config: &Config,
    flags: &StreamFlags,
) -> anyhow::Result<Option<Arc<dyn ChatFeed>>> {
    let Some(url) = flags.youtube_url.as_ref().or(config.youtube.url.as_ref()) else {
        return Ok(None);
    };
    let key_env = &config.youtube.api_key_env;
    let api_key = std::env::var(key_env)
        .with_context(|| format!("{key_env} must be set to read YouTube chat"))?;
    let chat = YoutubeChat::connect(&config.youtube.api_base, &api_key, url).await?;
    Ok(Some(Arc::new(chat)))
}

/// Bind the configured port and run the streamer.
pub async fn run_stream(config: Config, flags: StreamFlags) -> anyhow::Result<()> {
    let remote_chat = connect_youtube(&config, &flags).await?;
    let port = flags.port.unwrap_or(config.server.port);
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    StreamRuntime::assemble_with(&config, &flags, remote_chat)
        .run(listener)
        .await
}
