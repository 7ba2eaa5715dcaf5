//! Gesture scripts: recorded input replayed through board sessions.
//!
//! A script is a JSON array of steps. Each step targets one peer (default
//! 0) and is fed to that peer's session as if it came from a pointer or
//! keyboard. Every step advances a virtual clock by one frame, and all
//! sessions tick after each step so peers see each other's edits.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use inkboard_core::Tool;
use inkboard_geometry::Point;
use inkboard_session::{BoardSession, BoardStore, Config, Key, PointerEvent, StaticIdentity};
use inkboard_sync::RoomHub;
use serde::Deserialize;
use tracing::{debug, info};

/// Time between steps, roughly one frame at 60 Hz
const FRAME: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub peer: usize,
    #[serde(flatten)]
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    Tool { tool: Tool },
    Down {
        x: f64,
        y: f64,
        #[serde(default)]
        shift: bool,
    },
    Move { x: f64, y: f64 },
    Up {
        x: f64,
        y: f64,
        #[serde(default)]
        shift: bool,
    },
    Leave,
    Key { key: KeyName },
    /// Type each character of `text`
    Type { text: String },
    Undo,
    Redo,
    Wait { ms: u64 },
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyName {
    Delete,
    Backspace,
    Escape,
    Enter,
    SelectAll,
}

impl From<KeyName> for Key {
    fn from(name: KeyName) -> Self {
        match name {
            KeyName::Delete => Key::Delete,
            KeyName::Backspace => Key::Backspace,
            KeyName::Escape => Key::Escape,
            KeyName::Enter => Key::Enter,
            KeyName::SelectAll => Key::SelectAll,
        }
    }
}

pub fn load(path: &Path) -> Result<Vec<Step>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse(&content).with_context(|| format!("invalid script {}", path.display()))
}

pub fn parse(content: &str) -> Result<Vec<Step>> {
    Ok(serde_json::from_str(content)?)
}

/// Identity for peer `n`; peer 0 is the configured user
fn peer_identity(config: &Config, n: usize) -> StaticIdentity {
    if n == 0 {
        StaticIdentity::new(config.user_id.clone(), config.display_name.clone())
    } else {
        StaticIdentity::new(format!("{}-peer{n}", config.user_id), None)
    }
}

/// Replay `steps` into `room_id` with `peers` sessions, then save and
/// close them. Returns the number of shapes on the board afterwards.
pub fn replay<B: BoardStore + Clone>(
    boards: &B,
    config: &Config,
    room_id: &str,
    steps: &[Step],
    peers: usize,
) -> Result<usize> {
    let peers = peers.max(1);
    if let Some(step) = steps.iter().find(|s| s.peer >= peers) {
        bail!("script addresses peer {} but only {peers} peer(s) joined", step.peer);
    }

    let hub = RoomHub::new();
    let mut sessions = (0..peers)
        .map(|n| BoardSession::open(&hub, boards.clone(), &peer_identity(config, n), room_id, config))
        .collect::<Result<Vec<_>>>()?;

    let mut now = Instant::now();
    for (i, step) in steps.iter().enumerate() {
        debug!(step = i, peer = step.peer, action = ?step.action, "replaying");
        now += FRAME;
        apply(&mut sessions[step.peer], &step.action, &mut now)?;
        for session in &mut sessions {
            session.tick(now)?;
        }
    }

    let shapes = sessions[0].pipeline().canvas().len();
    for session in sessions {
        session.close()?;
    }
    info!(room = room_id, steps = steps.len(), peers, shapes, "script replayed");
    Ok(shapes)
}

fn apply<B: BoardStore>(session: &mut BoardSession<B>, action: &Action, now: &mut Instant) -> Result<()> {
    let at = *now;
    let event = |x: f64, y: f64, shift: bool| {
        let event = PointerEvent::new(Point::new(x, y), at);
        if shift { event.with_shift() } else { event }
    };
    match action {
        Action::Tool { tool } => session.set_tool(*tool),
        Action::Down { x, y, shift } => session.pointer_down(event(*x, *y, *shift)),
        Action::Move { x, y } => session.pointer_move(event(*x, *y, false)),
        Action::Up { x, y, shift } => session.pointer_up(event(*x, *y, *shift)),
        Action::Leave => session.pointer_leave(),
        Action::Key { key } => session.key((*key).into()),
        Action::Type { text } => text.chars().for_each(|c| session.key(Key::Char(c))),
        Action::Undo => {
            session.undo();
        }
        Action::Redo => {
            session.redo();
        }
        Action::Wait { ms } => *now += Duration::from_millis(*ms),
        Action::Save => session.save()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_session::{FileBoardStore, FileConfig, UserId};

    fn fixture() -> (tempfile::TempDir, FileBoardStore, Config) {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().to_string_lossy().to_string();
        let config = Config::resolve(FileConfig::default(), |key| match key {
            "INKBOARD_USER_ID" => Some("ada".to_string()),
            "INKBOARD_DATA_DIR" => Some(data_dir.clone()),
            _ => None,
        })
        .unwrap();
        let boards = FileBoardStore::new(config.boards_dir());
        boards.create(&UserId::new("ada"), "Script", Some("room")).unwrap();
        (dir, boards, config)
    }

    #[test]
    fn parses_steps() {
        let steps = parse(
            r#"[
                {"action": "tool", "tool": "rectangle"},
                {"action": "down", "x": 1, "y": 2, "shift": true},
                {"peer": 1, "action": "key", "key": "selectall"},
                {"action": "type", "text": "hi"}
            ]"#,
        )
        .unwrap();
        assert_eq!(steps[0].action, Action::Tool { tool: Tool::Rectangle });
        assert_eq!(steps[1].action, Action::Down { x: 1.0, y: 2.0, shift: true });
        assert_eq!(steps[2].peer, 1);
        assert_eq!(steps[2].action, Action::Key { key: KeyName::SelectAll });
    }

    #[test]
    fn replay_saves_the_board() {
        let (_dir, boards, config) = fixture();
        let steps = parse(
            r#"[
                {"action": "tool", "tool": "rectangle"},
                {"action": "down", "x": 0, "y": 0},
                {"action": "move", "x": 10, "y": 10},
                {"action": "up", "x": 20, "y": 20},
                {"peer": 1, "action": "tool", "tool": "circle"},
                {"peer": 1, "action": "down", "x": 50, "y": 50},
                {"peer": 1, "action": "up", "x": 90, "y": 90}
            ]"#,
        )
        .unwrap();

        let shapes = replay(&boards, &config, "room", &steps, 2).unwrap();
        assert_eq!(shapes, 2);
        let saved = boards.load_board("room").unwrap().unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].shape_type, "circle");
    }

    #[test]
    fn unknown_peer_is_rejected() {
        let (_dir, boards, config) = fixture();
        let steps = parse(r#"[{"peer": 3, "action": "undo"}]"#).unwrap();
        assert!(replay(&boards, &config, "room", &steps, 2).is_err());
    }
}
