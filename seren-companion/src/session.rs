//! The interactive daily check-in loop
//!
//! Each turn: read the user's input (typed text or an `@path` reference
//! to a recording), transcribe if needed, run the Guardian safety check,
//! speak the Companion reply, then analyze and persist the turn. The
//! loop ends on a quit word, a farewell phrase, a Guardian escalation,
//! stdin closing, or shutdown.

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use seren_core::{SessionStore, SpeechSynthesizer, Transcriber};

use crate::capture::{TurnRecorder, WavFileFeed};
use crate::subsystems::{Analyst, Companion, Guardian};

const GREETING: &str = "Initiating Seren Daily Check-in";
const SESSION_ENDED: &str = "Okay, session ended. Take care. I'm here when you need me.";
const NO_AUDIO: &str = "I didn't catch that. When you're ready, you can try again.";
const EMPTY_TRANSCRIPT: &str = "I didn't quite catch that. Could you try saying it again?";
const FAREWELL_REPLY: &str = "Got it. Thanks for checking in today. I'm here tomorrow if you need me!";

const QUIT_WORDS: [&str; 4] = ["quit", "exit", "stop", "end"];
const FAREWELL_TRIGGERS: [&str; 2] = ["goodbye", "that's all for today"];

/// Everything one check-in session needs, wired up by the caller.
pub struct SessionContext {
    pub store: SessionStore,
    pub analyst: Analyst,
    pub guardian: Guardian,
    pub companion: Companion,
    pub transcriber: Arc<dyn Transcriber>,
    pub recorder: TurnRecorder,
    pub voice: Option<Arc<dyn SpeechSynthesizer>>,
    pub shutdown: CancellationToken,
}

impl SessionContext {
    /// Voice the reply when a synthesizer is attached; the text is always
    /// printed regardless.
    async fn speak(&self, text: &str) {
        let Some(voice) = &self.voice else { return };
        let path = std::env::temp_dir().join(format!(
            "seren_reply_{}.wav",
            Utc::now().timestamp_millis()
        ));
        if let Err(e) = voice.synthesize(text, &path).await {
            tracing::warn!(error = %e, "Speech synthesis failed");
        }
    }
}

/// Run the check-in conversation until the user or the Guardian ends it.
pub async fn run_checkin(ctx: &SessionContext) -> Result<()> {
    ctx.store.initialize().await?;

    println!("{GREETING}");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        println!("Your turn (text, @recording.wav, or 'quit'):");

        let line = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                tracing::info!("Shutdown requested, ending session");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            tracing::info!("Input closed, ending session");
            break;
        };

        let Some(input) = parse_turn_input(&line) else {
            continue;
        };

        let (transcript, audio) = match input {
            TurnInput::Quit => {
                println!("Seren: {SESSION_ENDED}");
                ctx.speak(SESSION_ENDED).await;
                break;
            }
            TurnInput::Audio(path) => {
                let mut feed = WavFileFeed::new(&path);
                let turn = match ctx.recorder.record(&mut feed, ctx.shutdown.child_token()).await
                {
                    Ok(turn) => turn,
                    Err(e) => {
                        tracing::warn!(error = %e, "Could not read the referenced recording");
                        None
                    }
                };
                let Some(turn) = turn else {
                    println!("Seren: {NO_AUDIO}");
                    ctx.speak(NO_AUDIO).await;
                    continue;
                };

                let transcript = match ctx.transcriber.transcribe(&turn.path).await {
                    Ok(transcript) => transcript,
                    Err(e) => {
                        tracing::warn!(error = %e, "Transcription failed");
                        String::new()
                    }
                };
                (transcript, Some(turn.path))
            }
            TurnInput::Text(text) => (text, None),
        };

        if transcript.trim().is_empty() {
            println!("Seren: {EMPTY_TRANSCRIPT}");
            ctx.speak(EMPTY_TRANSCRIPT).await;
            continue;
        }

        if audio.is_some() {
            println!("You: {transcript}");
        }

        if let Some(alert) = ctx.guardian.check(&transcript).await {
            let severity = if alert.is_immediate() { "immediate" } else { "trend" };
            tracing::warn!(severity, "Guardian escalation raised");
            println!("Seren (Guardian): {}", alert.message());
            ctx.speak(alert.message()).await;
            break;
        }

        let reply = ctx.companion.reply(&transcript).await;
        println!("Seren: {reply}");
        ctx.speak(&reply).await;

        let report = ctx
            .analyst
            .analyze_and_log(&transcript, audio.as_deref())
            .await;
        tracing::info!(
            session_id = %report.entry.session_id,
            mood = report.entry.mood_score,
            anxiety = report.entry.anxiety_score,
            risk = report.entry.risk_level,
            persisted = report.persisted,
            "Turn analyzed"
        );

        if is_farewell(&transcript) {
            println!("Seren: {FAREWELL_REPLY}");
            ctx.speak(FAREWELL_REPLY).await;
            break;
        }
    }

    Ok(())
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

enum TurnInput {
    Quit,
    Audio(PathBuf),
    Text(String),
}

/// Classify one input line; `None` asks for another line.
fn parse_turn_input(line: &str) -> Option<TurnInput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if QUIT_WORDS.contains(&trimmed.to_lowercase().as_str()) {
        return Some(TurnInput::Quit);
    }
    if let Some(path) = trimmed.strip_prefix('@') {
        return Some(TurnInput::Audio(PathBuf::from(path.trim())));
    }
    Some(TurnInput::Text(trimmed.to_string()))
}

fn is_farewell(transcript: &str) -> bool {
    let lowered = transcript.to_lowercase();
    FAREWELL_TRIGGERS
        .iter()
        .any(|trigger| lowered.contains(trigger))
}

// ============================================================================
// TESTS
// ============================================================================
