//! Interactive terminal front-end.
//!
//! ```text
//! stdin line ─▶ parse_line() ─▶ Shell::execute() ─▶ QuestLogSession
//! auto-save deadline ─────────▶ QuestLogSession::tick()
//! EOF / quit / Ctrl-C ────────▶ QuestLogSession::shutdown()
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};
use crate::session::{Navigation, QuestLogSession};
use crate::types::{ObjectiveInput, QuestDraft};
use crate::view;

pub const HELP: &str = "\
Menu:     list | new <name> | open <n|id> | import <path> | templates | template <id>
Log:      show | add <title> | <objective>; <objective> [| <description>]
          quest <n> | edit <title> | <objective>; ... [| <description>] | toggle <n>
          save | export [path] | delete | back
Anywhere: help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    List,
    New(String),
    Open(String),
    Import(PathBuf),
    Templates,
    UseTemplate(String),
    Show,
    Add(QuestDraft),
    Edit(QuestDraft),
    Quest(usize),
    Toggle(usize),
    Save,
    Export(Option<PathBuf>),
    Delete,
    Back,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Exit,
}

/// `<title> | <obj>; <obj> [| <description>]`
fn parse_draft(rest: &str) -> Result<QuestDraft, String> {
    let mut parts = rest.splitn(3, '|');
    let title = parts.next().unwrap_or_default().trim();
    let objectives = parts
        .next()
        .ok_or("expected `<title> | <objective>; <objective>`")?;
    let description = parts.next().unwrap_or_default().trim();
    Ok(QuestDraft::new(title, objectives.split(';').map(str::trim)).with_description(description))
}

fn parse_index(rest: &str) -> Result<usize, String> {
    match rest.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("expected a number starting at 1, got '{}'", rest.trim())),
    }
}

fn required(rest: &str, what: &str) -> Result<String, String> {
    if rest.is_empty() {
        Err(format!("missing {what}"))
    } else {
        Ok(rest.to_string())
    }
}

pub fn parse_line(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));
    match word.to_ascii_lowercase().as_str() {
        "list" | "ls" => Ok(ShellCommand::List),
        // An empty name goes through so the store rejects it with its own message.
        "new" => Ok(ShellCommand::New(rest.to_string())),
        "open" => required(rest, "log number or id").map(ShellCommand::Open),
        "import" => required(rest, "file path").map(|p| ShellCommand::Import(PathBuf::from(p))),
        "templates" => Ok(ShellCommand::Templates),
        "template" => required(rest, "template id").map(ShellCommand::UseTemplate),
        "show" => Ok(ShellCommand::Show),
        "add" => parse_draft(rest).map(ShellCommand::Add),
        "edit" => parse_draft(rest).map(ShellCommand::Edit),
        "quest" | "select" => parse_index(rest).map(ShellCommand::Quest),
        "toggle" | "t" => parse_index(rest).map(ShellCommand::Toggle),
        "save" => Ok(ShellCommand::Save),
        "export" => Ok(ShellCommand::Export((!rest.is_empty()).then(|| PathBuf::from(rest)))),
        "delete" => Ok(ShellCommand::Delete),
        "back" => Ok(ShellCommand::Back),
        "help" | "?" => Ok(ShellCommand::Help),
        "quit" | "q" | "exit" => Ok(ShellCommand::Quit),
        "" => Err(String::new()),
        other => Err(format!("unknown command '{other}', type 'help'")),
    }
}

/// The session already turned `e` into a notification. Only failures the
/// user did not cause are worth a warning in the log.
fn log_failure(e: &ServiceError) {
    if e.is_user_input() {
        debug!(error = %e, "command rejected");
    } else {
        warn!(error = %e, "command failed");
    }
}

pub struct Shell {
    session: QuestLogSession,
    confirm_delete: bool,
}

impl Shell {
    pub fn new(session: QuestLogSession) -> Self {
        Self {
            session,
            confirm_delete: false,
        }
    }

    pub fn session(&self) -> &QuestLogSession {
        &self.session
    }

    pub fn into_session(self) -> QuestLogSession {
        self.session
    }

    pub fn start(&mut self, out: &mut impl Write) -> io::Result<()> {
        self.session.start();
        let menu = view::render_menu(&self.session.summaries(), self.session.now());
        writeln!(out, "{menu}")?;
        self.flush_notifications(out)
    }

    /// One line of input. A pending delete confirmation consumes the line.
    pub fn handle_line(&mut self, line: &str, out: &mut impl Write) -> io::Result<LoopControl> {
        if std::mem::take(&mut self.confirm_delete) {
            if matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                if let Err(e) = self.session.delete_current_log() {
                    log_failure(&e);
                }
                let menu = view::render_menu(&self.session.summaries(), self.session.now());
                writeln!(out, "{menu}")?;
            } else {
                writeln!(out, "Delete cancelled.")?;
            }
            self.flush_notifications(out)?;
            return Ok(LoopControl::Continue);
        }

        let control = match parse_line(line) {
            Ok(command) => self.execute(command, out)?,
            Err(message) => {
                if !message.is_empty() {
                    writeln!(out, "{message}")?;
                }
                LoopControl::Continue
            }
        };
        self.flush_notifications(out)?;
        Ok(control)
    }

    pub fn execute(
        &mut self,
        command: ShellCommand,
        out: &mut impl Write,
    ) -> io::Result<LoopControl> {
        let now = self.session.now();
        let result: ServiceResult<()> = match command {
            ShellCommand::Quit => return Ok(LoopControl::Exit),
            ShellCommand::Help => {
                writeln!(out, "{HELP}")?;
                Ok(())
            }
            ShellCommand::List => {
                writeln!(out, "{}", view::render_menu(&self.session.summaries(), now))?;
                Ok(())
            }
            ShellCommand::Back => {
                self.session.close_log();
                writeln!(out, "{}", view::render_menu(&self.session.summaries(), now))?;
                Ok(())
            }
            ShellCommand::New(name) => self.session.create_log(&name).map(|_| ()),
            ShellCommand::Open(target) => {
                let id = self.resolve_log(&target);
                self.session.open_log(&id)
            }
            ShellCommand::Import(path) => match std::fs::read_to_string(&path) {
                Ok(text) => self.session.import_document(&text).map(|_| ()),
                Err(e) => {
                    writeln!(out, "cannot read {}: {e}", path.display())?;
                    Ok(())
                }
            },
            ShellCommand::Templates => {
                let templates = self.session.templates();
                write!(out, "{}", view::render_templates(&templates))?;
                Ok(())
            }
            ShellCommand::UseTemplate(id) => self.session.use_template(&id).map(|_| ()),
            ShellCommand::Show => Ok(()),
            ShellCommand::Add(draft) => self.session.add_quest(&draft).map(|_| ()),
            ShellCommand::Edit(draft) => {
                let draft = self.keep_objective_ids(draft);
                self.session.edit_quest(&draft)
            }
            ShellCommand::Quest(n) => match self.quest_id_at(n) {
                Some(id) => self.session.select_quest(&id),
                None => {
                    writeln!(out, "no quest #{n}")?;
                    Ok(())
                }
            },
            ShellCommand::Toggle(n) => match self.objective_id_at(n) {
                Some(id) => self.session.toggle_objective(&id).map(|_| ()),
                None => {
                    writeln!(out, "no objective #{n} (select a quest first)")?;
                    Ok(())
                }
            },
            ShellCommand::Save => {
                self.session.save_now();
                writeln!(out, "{}", self.session.save_status())?;
                Ok(())
            }
            ShellCommand::Export(path) => match self.session.export_current() {
                Ok(exported) => {
                    let path = path.unwrap_or_else(|| PathBuf::from(&exported.file_name));
                    match std::fs::write(&path, exported.document) {
                        Ok(()) => writeln!(out, "wrote {}", path.display())?,
                        Err(e) => writeln!(out, "cannot write {}: {e}", path.display())?,
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            },
            ShellCommand::Delete => {
                if let Some(log) = self.session.current_log() {
                    writeln!(out, "Delete '{}'? This cannot be undone. [y/N]", log.name)?;
                    self.confirm_delete = true;
                } else {
                    writeln!(out, "No quest log is open")?;
                }
                return Ok(LoopControl::Continue);
            }
        };
        if let Err(e) = result {
            log_failure(&e);
        }
        self.render_current(out)?;
        Ok(LoopControl::Continue)
    }

    /// Fires a due auto-save and reports the new status.
    pub fn tick(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.session.tick().is_some() {
            writeln!(out, "{}", self.session.save_status())?;
            self.flush_notifications(out)?;
        }
        Ok(())
    }

    pub fn shutdown(&mut self, out: &mut impl Write) -> io::Result<()> {
        if self.session.shutdown().is_some() {
            writeln!(out, "{}", self.session.save_status())?;
        }
        self.flush_notifications(out)
    }

    /// Time left until the pending auto-save, if one is scheduled.
    pub fn until_deadline(&self) -> Option<Duration> {
        let deadline = self.session.next_deadline()?;
        Some((deadline - self.session.now()).to_std().unwrap_or(Duration::ZERO))
    }

    fn render_current(&self, out: &mut impl Write) -> io::Result<()> {
        let Navigation::LogOpen { quest_id, .. } = self.session.navigation() else {
            return Ok(());
        };
        let now = self.session.now();
        if let Some(log) = self.session.current_log() {
            write!(
                out,
                "{}",
                view::render_log(log, quest_id.as_deref(), self.session.save_status(), now)
            )?;
        }
        if let Some(quest) = self.session.current_quest() {
            write!(out, "{}", view::render_quest(quest, now))?;
        }
        Ok(())
    }

    fn flush_notifications(&mut self, out: &mut impl Write) -> io::Result<()> {
        for n in self.session.take_notifications() {
            writeln!(out, "{}", view::render_notification(&n))?;
        }
        Ok(())
    }

    fn resolve_log(&self, target: &str) -> String {
        target
            .parse::<usize>()
            .ok()
            .and_then(|n| self.session.logs().get(n.checked_sub(1)?))
            .map(|log| log.id.clone())
            .unwrap_or_else(|| target.to_string())
    }

    fn quest_id_at(&self, n: usize) -> Option<String> {
        let log = self.session.current_log()?;
        log.quests.get(n.checked_sub(1)?).map(|q| q.id.clone())
    }

    fn objective_id_at(&self, n: usize) -> Option<String> {
        let quest = self.session.current_quest()?;
        quest.objectives.get(n.checked_sub(1)?).map(|o| o.id.clone())
    }

    /// Objectives are matched to the selected quest's by position so edited
    /// rows keep their ids and completion.
    fn keep_objective_ids(&self, mut draft: QuestDraft) -> QuestDraft {
        if let Some(quest) = self.session.current_quest() {
            for (input, existing) in draft.objectives.iter_mut().zip(&quest.objectives) {
                *input = ObjectiveInput::existing(existing.id.clone(), input.title.clone());
            }
        }
        draft
    }
}

/// What a shell step left behind after running on the blocking pool.
struct Step<T> {
    shell: Shell,
    output: Vec<u8>,
    result: io::Result<T>,
}

/// Runs `f` on tokio's blocking pool. Session calls block on the server and
/// the cache file, so they must not run on the event loop thread.
async fn off_loop<T, F>(shell: Shell, f: F) -> io::Result<Step<T>>
where
    T: Send + 'static,
    F: FnOnce(&mut Shell, &mut Vec<u8>) -> io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut shell = shell;
        let mut output = Vec::new();
        let result = f(&mut shell, &mut output);
        Step {
            shell,
            output,
            result,
        }
    })
    .await
    .map_err(io::Error::other)
}

/// One shell step that Ctrl-C can cut short, even while a save is hung.
async fn step<T, F>(shell: Shell, f: F) -> io::Result<(Shell, T)>
where
    T: Send + 'static,
    F: FnOnce(&mut Shell, &mut Vec<u8>) -> io::Result<T> + Send + 'static,
{
    let done = tokio::select! {
        done = off_loop(shell, f) => done?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted while waiting on the server or the local backup");
            std::process::exit(130);
        }
    };
    let mut stdout = io::stdout();
    stdout.write_all(&done.output)?;
    stdout.flush()?;
    Ok((done.shell, done.result?))
}

/// Runs the shell on stdin/stdout until EOF, `quit` or Ctrl-C, then flushes.
pub async fn run(session: QuestLogSession) -> io::Result<QuestLogSession> {
    let (mut shell, ()) = step(Shell::new(session), |shell, out| {
        shell.start(out)?;
        writeln!(out, "Type 'help' for commands.")
    })
    .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let wait = shell.until_deadline();
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let (next, control) =
                        step(shell, move |shell, out| shell.handle_line(&line, out)).await?;
                    shell = next;
                    if control == LoopControl::Exit {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("stdin EOF");
                    break;
                }
                Err(e) => {
                    step(shell, |shell, out| shell.shutdown(out)).await?;
                    return Err(e);
                }
            },
            _ = tokio::time::sleep(wait.unwrap_or(Duration::ZERO)), if wait.is_some() => {
                let (next, ()) = step(shell, |shell, out| shell.tick(out)).await?;
                shell = next;
            }
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
        }
    }

    let (shell, ()) = step(shell, |shell, out| shell.shutdown(out)).await?;
    Ok(shell.into_session())
}
