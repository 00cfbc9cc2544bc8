//! Text command dispatch.
//!
//! Parses `!play`-style messages and turns them into queue operations on the
//! destination's session. Every outcome, including failures, becomes a
//! human-readable [`CommandReply`].

use std::sync::Arc;

use serde::Serialize;

use super::{SessionRegistry, SessionState};
use crate::error::QueueError;

/// Reply when the command name is not recognised.
pub const HELP_REPLY: &str = "Available commands: play, playlist, skip, previous, queue";

/// Who issued a command and where it should act.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Identifier of the issuing user.
    pub actor: String,
    /// Destination the actor is currently in, if any.
    pub actor_destination: Option<String>,
    /// Destination the command targets.
    pub destination: String,
}

/// Outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    /// False when the command was rejected or failed.
    pub ok: bool,
    pub text: String,
}

impl CommandReply {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    fn fail(text: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Playlist,
    Skip,
    Previous,
    Queue,
}

impl Command {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "play" => Some(Self::Play),
            "playlist" => Some(Self::Playlist),
            "skip" => Some(Self::Skip),
            "previous" => Some(Self::Previous),
            "queue" => Some(Self::Queue),
            _ => None,
        }
    }
}

/// Routes text commands to the session registry.
pub struct CommandRouter {
    registry: Arc<SessionRegistry>,
    prefix: String,
}

impl CommandRouter {
    pub fn new(registry: Arc<SessionRegistry>, prefix: impl Into<String>) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
        }
    }

    /// Handles one message.
    ///
    /// Returns `None` for text that is not a command (no prefix).
    pub async fn dispatch(&self, ctx: &CommandContext, text: &str) -> Option<CommandReply> {
        let body = text.trim_start().strip_prefix(self.prefix.as_str())?;
        let (name, args) = match body.trim_start().split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body.trim(), ""),
        };

        let Some(command) = Command::parse(name) else {
            return Some(CommandReply::fail(HELP_REPLY));
        };

        if let Some(rejection) = self.check_colocated(ctx) {
            log::debug!(
                "[Router] Rejected {:?} from {} for {}",
                command,
                ctx.actor,
                ctx.destination
            );
            return Some(rejection);
        }

        log::debug!(
            "[Router] {} -> {:?} on {} ({})",
            ctx.actor,
            command,
            ctx.destination,
            args
        );

        let reply = match command {
            Command::Play => self.play(&ctx.destination, args).await,
            Command::Playlist => self.playlist(&ctx.destination, args).await,
            Command::Skip => self.skip(&ctx.destination).await,
            Command::Previous => self.previous(&ctx.destination).await,
            Command::Queue => self.queue(&ctx.destination).await,
        };
        Some(reply)
    }

    fn check_colocated(&self, ctx: &CommandContext) -> Option<CommandReply> {
        match ctx.actor_destination.as_deref() {
            None => Some(CommandReply::fail(
                "You must be in a destination to use this command.",
            )),
            Some(d) if d != ctx.destination => Some(CommandReply::fail(
                "You must be in the same destination as the bot to use this command.",
            )),
            Some(_) => None,
        }
    }

    async fn play(&self, destination: &str, query: &str) -> CommandReply {
        if query.is_empty() {
            return CommandReply::fail("Please provide a URL or search term.");
        }
        let session = match self.registry.get_or_bind(destination).await {
            Ok(session) => session,
            Err(e) => return self.failure(destination, e).await,
        };
        match session.controller().add(query).await {
            Ok(track) => {
                let mut text = format!("Added to queue: {}", track.title());
                // An add into an idle queue that is still idle found nothing playable.
                if session.controller().snapshot().await.state == SessionState::Idle {
                    text.push_str(", but none of the songs in the queue could be played.");
                }
                CommandReply::ok(text)
            }
            Err(e) => self.failure(destination, e).await,
        }
    }

    async fn playlist(&self, destination: &str, reference: &str) -> CommandReply {
        if reference.is_empty() {
            return CommandReply::fail("Please provide a playlist URL.");
        }
        let result = match self.registry.get_or_bind(destination).await {
            Ok(session) => session.controller().add_playlist(reference).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(tracks) => {
                CommandReply::ok(format!("Loaded {} songs from the playlist.", tracks.len()))
            }
            Err(e) => self.failure(destination, e).await,
        }
    }

    async fn skip(&self, destination: &str) -> CommandReply {
        let Some(session) = self.registry.get(destination) else {
            return self.failure(destination, QueueError::EmptyQueue).await;
        };
        match session.controller().skip().await {
            Ok(track) => CommandReply::ok(format!("Skipped to the next song: {}", track.title())),
            Err(e) => self.failure(destination, e).await,
        }
    }

    async fn previous(&self, destination: &str) -> CommandReply {
        let Some(session) = self.registry.get(destination) else {
            return self.failure(destination, QueueError::EmptyQueue).await;
        };
        match session.controller().previous().await {
            Ok(track) => CommandReply::ok(format!(
                "Went back to the previous song: {}",
                track.title()
            )),
            Err(e) => self.failure(destination, e).await,
        }
    }

    async fn queue(&self, destination: &str) -> CommandReply {
        let Some(session) = self.registry.get(destination) else {
            return self.failure(destination, QueueError::EmptyQueue).await;
        };
        match session.controller().list_queue().await {
            Ok(entries) if entries.is_empty() => {
                self.failure(destination, QueueError::EmptyQueue).await
            }
            Ok(entries) => {
                let lines: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{}. {}", e.position, e.title))
                    .collect();
                CommandReply::ok(format!("Current queue:\n{}", lines.join("\n")))
            }
            Err(e) => self.failure(destination, e).await,
        }
    }

    /// Converts an error into a reply, tearing the session down if it is fatal.
    async fn failure(&self, destination: &str, err: QueueError) -> CommandReply {
        if err.is_fatal() {
            log::warn!("[Router] {}: {}; tearing down", destination, err);
            self.registry.teardown(destination).await;
        } else {
            log::debug!("[Router] {}: {}", destination, err);
        }

        let text = match &err {
            QueueError::EmptyQueue => "The queue is empty.".to_string(),
            QueueError::Resolution { query, .. } => {
                format!("No results found for '{query}'.")
            }
            QueueError::PlaybackExhausted { .. } => {
                "None of the songs in the queue could be played.".to_string()
            }
            QueueError::DestinationUnreachable { .. } => {
                "Lost the connection to the destination; the queue was cleared.".to_string()
            }
            QueueError::Cancelled => "The session was stopped.".to_string(),
            other => format!("An error occurred: {other}"),
        };
        CommandReply::fail(text)
    }
}
