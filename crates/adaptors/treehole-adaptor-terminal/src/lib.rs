//! Terminal front end: a line loop over a [`ChatSession`]
//!
//! Plain lines are sent as chat turns. Lines starting with `/` are commands.
//! Ctrl-C while a reply is streaming cancels that turn; at the prompt it quits.

use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use treehole_core::chat::{ChatSession, TurnEvent, TurnOutcome, TurnState};
use treehole_core::transcript::Role;
use treehole_core::utils::logger::Logger;
use treehole_core::voice::{synthesize, upload_reference, TtsOptions};
use treehole_core::{
    analyze_emotion, update_display_name, upload_avatar, ApiClient, ChatTurn, Result,
    SessionContext,
};

static COMMAND_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([A-Za-z]+)(?:\s+(.*))?$").expect("command regex"));

/// Terminal options
#[derive(Clone, Debug)]
pub struct TerminalConfig {
    /// Name shown before assistant replies
    pub assistant_label: String,
    /// Prefix notices with the local time
    pub show_timestamps: bool,
    /// Ask for emotion analysis after each completed turn
    pub analyze_emotion: bool,
    /// Where `/speak` writes audio files
    pub audio_dir: PathBuf,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            assistant_label: "treehole".to_string(),
            show_timestamps: true,
            analyze_emotion: false,
            audio_dir: PathBuf::from("."),
        }
    }
}

/// A parsed input line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send as a chat turn
    Say(String),
    /// Leave the loop
    Quit,
    /// List commands
    Help,
    /// Show who is chatting and the relationship score
    Status,
    /// Change the display name
    Name(String),
    /// Upload an avatar image
    Avatar(PathBuf),
    /// Upload a reference recording for the cloned voice
    Voice(PathBuf),
    /// Synthesize text, or the last reply when empty
    Speak(String),
    /// Anything else starting with `/`
    Unknown(String),
}

/// Parse one input line; blank lines yield `None`
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(caps) = COMMAND_RE.captures(line) else {
        if line.starts_with('/') {
            return Some(Command::Unknown(line.to_string()));
        }
        return Some(Command::Say(line.to_string()));
    };
    let arg = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let cmd = match caps[1].to_ascii_lowercase().as_str() {
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        "status" => Command::Status,
        "name" if !arg.is_empty() => Command::Name(arg),
        "avatar" if !arg.is_empty() => Command::Avatar(PathBuf::from(arg)),
        "voice" if !arg.is_empty() => Command::Voice(PathBuf::from(arg)),
        "speak" => Command::Speak(arg),
        other => Command::Unknown(format!("/{}", other)),
    };
    Some(cmd)
}

const HELP: &str = "\
/status          who you are and how close you are
/name <name>     change your display name
/avatar <path>   upload an avatar image
/voice <path>    upload a reference recording for your voice
/speak [text]    speak text, or the last reply, in your voice
/quit            leave";

/// Clears the current terminal line
pub const ERASE_LINE: &str = "\r\x1b[2K";

/// Turns [`TurnEvent`]s into terminal output
///
/// Tracks whether the cursor sits on an unfinished line (the composing
/// marker or a reply being streamed) so that notices and terminal states
/// always start on a fresh line and never leave the marker behind.
#[derive(Clone, Debug)]
pub struct TranscriptRenderer {
    config: TerminalConfig,
    open_line: bool,
}

impl TranscriptRenderer {
    /// Create a renderer
    pub fn new(config: TerminalConfig) -> Self {
        Self {
            config,
            open_line: false,
        }
    }

    /// Text to print for `event`, if any
    pub fn render(&mut self, event: &TurnEvent) -> Option<String> {
        match event {
            TurnEvent::Waiting(true) => {
                self.open_line = true;
                Some(format!("{} is typing...", self.config.assistant_label))
            }
            TurnEvent::Waiting(false) => {
                self.open_line = false;
                Some(ERASE_LINE.to_string())
            }
            TurnEvent::AssistantStarted(text) => {
                self.open_line = true;
                Some(format!("{}: {}", self.config.assistant_label, text))
            }
            TurnEvent::Fragment(text) => Some(text.clone()),
            TurnEvent::StateChanged(state) if state.is_terminal() => {
                Some(self.break_line()).filter(|b| !b.is_empty()).map(str::to_string)
            }
            TurnEvent::Notice(msg) => Some(format!("{}{}\n", self.break_line(), self.notice(msg))),
            _ => None,
        }
    }

    /// A whole line of adaptor output, ending any unfinished line first
    pub fn line(&mut self, text: &str) -> String {
        format!("{}{}\n", self.break_line(), text)
    }

    /// A transient message line
    pub fn notice(&self, msg: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] ! {}", chrono::Local::now().format("%H:%M:%S"), msg)
        } else {
            format!("! {}", msg)
        }
    }

    fn break_line(&mut self) -> &'static str {
        if std::mem::take(&mut self.open_line) {
            "\n"
        } else {
            ""
        }
    }
}

/// Where rendered output goes
struct Screen {
    renderer: TranscriptRenderer,
    out: Box<dyn Write + Send>,
}

impl Screen {
    fn event(&mut self, event: &TurnEvent) {
        if let Some(text) = self.renderer.render(event) {
            self.write(&text);
        }
    }

    fn line(&mut self, text: &str) {
        let text = self.renderer.line(text);
        self.write(&text);
    }

    fn notice(&mut self, msg: &str) {
        let text = self.renderer.notice(msg);
        self.line(&text);
    }

    fn write(&mut self, text: &str) {
        // A closed terminal is not worth failing the conversation over
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

/// Interactive chat in the terminal
pub struct TerminalAdaptor {
    /// Options
    pub config: TerminalConfig,
    api: ApiClient,
    ctx: SessionContext,
    chat: ChatSession,
    events: mpsc::UnboundedReceiver<TurnEvent>,
    screen: Screen,
    tts: TtsOptions,
    logger: Logger,
}

impl TerminalAdaptor {
    /// Wrap a chat session for `ctx`, printing to stdout
    pub fn new(
        config: TerminalConfig,
        api: ApiClient,
        ctx: SessionContext,
        mut chat: ChatSession,
    ) -> Self {
        let events = chat.subscribe();
        let screen = Screen {
            renderer: TranscriptRenderer::new(config.clone()),
            out: Box::new(std::io::stdout()),
        };
        Self {
            config,
            api,
            ctx,
            chat,
            events,
            screen,
            tts: TtsOptions::default(),
            logger: Logger::new("terminal"),
        }
    }

    /// Use these synthesis options for `/speak`
    pub fn with_tts_options(mut self, tts: TtsOptions) -> Self {
        self.tts = tts;
        self
    }

    /// Print to `out` instead of stdout
    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.screen.out = out;
        self
    }

    /// Underlying chat session
    pub fn chat(&self) -> &ChatSession {
        &self.chat
    }

    /// Current session
    pub fn session(&self) -> &SessionContext {
        &self.ctx
    }

    /// Run on stdin until `/quit`, end of input, or Ctrl-C at the prompt
    ///
    /// Ctrl-C while a reply is on its way cancels that turn only.
    pub async fn start(&mut self) -> Result<()> {
        let (tx, interrupts) = mpsc::unbounded_channel();
        let listener = tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(()).is_err() {
                    break;
                }
            }
        });
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let result = self.run_with(stdin, interrupts).await;
        listener.abort();
        result
    }

    /// Run on any line source, taking interrupts from `interrupts`
    pub async fn run_with<R: AsyncBufRead + Unpin>(
        &mut self,
        input: R,
        mut interrupts: mpsc::UnboundedReceiver<()>,
    ) -> Result<()> {
        self.logger
            .info(&format!("chatting as {}", self.ctx.display_label()));
        self.print_history();

        let mut lines = input.lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => line,
                    None => break,
                },
                Some(()) = interrupts.recv() => {
                    self.logger.debug("interrupted at the prompt");
                    break;
                }
            };
            let Some(command) = parse_command(&line) else {
                continue;
            };
            let result = match command {
                Command::Quit => break,
                Command::Say(text) => self.say(&text, &mut interrupts).await,
                other => self.handle(other).await,
            };
            if let Err(e) = result {
                self.screen.notice(&e.user_notice());
            }
        }
        Ok(())
    }

    fn print_history(&mut self) {
        for turn in self.chat.transcript().turns() {
            let who = match turn.role {
                Role::User => self.ctx.display_label(),
                Role::Assistant => self.config.assistant_label.clone(),
            };
            let text = format!("{}: {}", who, turn.content);
            self.screen.line(&text);
        }
    }

    async fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Help => self.screen.line(HELP),
            Command::Status => {
                let status = self.status_line();
                self.screen.line(&status);
            }
            Command::Name(name) => {
                update_display_name(&self.api, &mut self.ctx, &name).await?;
                let text = format!("you are now {}", self.ctx.display_label());
                self.screen.line(&text);
            }
            Command::Avatar(path) => {
                let url = upload_avatar(&self.api, &mut self.ctx, &path).await?;
                self.screen.line(&format!("avatar updated: {}", url));
            }
            Command::Voice(path) => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("my voice")
                    .to_string();
                let voice = upload_reference(&self.api, &self.ctx, &path, &name, "").await?;
                self.screen.line(&format!("voice stored ({})", voice.audio_id));
            }
            Command::Speak(text) => self.speak(&text).await?,
            Command::Unknown(raw) => {
                self.screen.line(&format!("unknown command {}, try /help", raw));
            }
            Command::Say(_) | Command::Quit => {}
        }
        Ok(())
    }

    async fn say(&mut self, text: &str, interrupts: &mut mpsc::UnboundedReceiver<()>) -> Result<()> {
        let history: Vec<_> = self.chat.transcript().turns().to_vec();
        let cancel = CancellationToken::new();
        let result = {
            let turn = self.chat.send_turn(&self.ctx, text, &cancel);
            tokio::pin!(turn);
            loop {
                tokio::select! {
                    result = &mut turn => break result,
                    Some(event) = self.events.recv() => self.screen.event(&event),
                    Some(()) = interrupts.recv(), if !cancel.is_cancelled() => cancel.cancel(),
                }
            }
        };
        // Everything the turn emitted is queued by now
        while let Ok(event) = self.events.try_recv() {
            self.screen.event(&event);
        }

        match result {
            Ok(TurnOutcome::Completed { round_id, .. }) => {
                if self.config.analyze_emotion {
                    self.report_emotion(&history, text, &round_id).await;
                }
                Ok(())
            }
            Ok(TurnOutcome::Cancelled { .. }) => {
                self.screen.line("(stopped)");
                Ok(())
            }
            // Failures were already shown as notices
            Err(e) => {
                self.logger.debug(&format!("turn ended with {}", e));
                Ok(())
            }
        }
    }

    async fn report_emotion(&mut self, history: &[ChatTurn], text: &str, round_id: &str) {
        match analyze_emotion(&self.api, &self.ctx, history, text, Some(round_id)).await {
            Ok(data) => {
                if let Some(emotion) = data.get("emotion").and_then(|v| v.as_str()) {
                    self.screen.line(&format!("(mood: {})", emotion));
                }
            }
            Err(e) => self.logger.debug(&format!("no emotion for {}: {}", round_id, e)),
        }
    }

    async fn speak(&mut self, text: &str) -> Result<()> {
        let text = if text.is_empty() {
            self.chat
                .transcript()
                .turns()
                .iter()
                .rev()
                .find(|t| t.role == Role::Assistant)
                .map(|t| t.content.clone())
                .unwrap_or_default()
        } else {
            text.to_string()
        };

        let audio = synthesize(&self.api, &self.ctx, &text, &self.tts).await?;
        let ext = match audio.content_type.as_str() {
            ct if ct.contains("wav") => "wav",
            ct if ct.contains("ogg") => "ogg",
            _ => "mp3",
        };
        let path = self.config.audio_dir.join(format!(
            "treehole-{}.{}",
            chrono::Local::now().format("%Y%m%d-%H%M%S"),
            ext
        ));
        tokio::fs::write(&path, &audio.data).await?;
        self.screen.line(&format!("saved {}", path.display()));
        Ok(())
    }

    fn status_line(&self) -> String {
        let favorability = self.ctx.favorability;
        format!(
            "{} with {} | favorability {:.0}/100 ({}) | {} turns | {}",
            self.ctx.display_label(),
            self.ctx.character_id.as_deref().unwrap_or("default character"),
            favorability.value(),
            favorability.band().label(),
            self.chat.transcript().len(),
            state_label(self.chat.state()),
        )
    }
}

fn state_label(state: TurnState) -> &'static str {
    match state {
        TurnState::Idle => "idle",
        TurnState::Sent | TurnState::Streaming => "replying",
        TurnState::Completed => "ready",
        TurnState::Failed => "last turn failed",
        TurnState::EmptyStream => "last reply was empty",
        TurnState::Interrupted => "last reply was cut off",
        TurnState::Cancelled => "last reply was stopped",
    }
}
