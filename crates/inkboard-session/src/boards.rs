//! Board persistence gateway.
//!
//! A board is the durable home of one room: its name, owner and the last
//! saved snapshot of the room's shapes. [`FileBoardStore`] keeps one JSON
//! file per board under a directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use inkboard_core::RecordData;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::identity::UserId;

/// A persisted board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: Uuid,
    pub room_id: String,
    pub name: String,
    /// Last saved snapshot, paint order; None until the first save
    #[serde(default)]
    pub board_data: Option<Vec<RecordData>>,
    pub owner_user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("no board for room `{0}`")]
    NotFound(String),

    #[error("room `{0}` already has a board")]
    RoomTaken(String),

    #[error("board for room `{room_id}` is owned by another user")]
    NotOwner { room_id: String },

    #[error("board name must not be empty")]
    EmptyName,

    #[error("not signed in")]
    Unauthenticated,

    #[error("board storage error")]
    Io(#[from] std::io::Error),

    #[error("corrupt board file")]
    Json(#[from] serde_json::Error),
}

/// CRUD plus snapshot load/save for boards
pub trait BoardStore {
    /// Create a board; a fresh room id is minted unless one is given
    fn create(&self, owner: &UserId, name: &str, room_id: Option<&str>) -> Result<Board, BoardError>;

    fn rename(&self, owner: &UserId, room_id: &str, name: &str) -> Result<Board, BoardError>;

    fn delete(&self, owner: &UserId, room_id: &str) -> Result<(), BoardError>;

    /// Boards owned by `owner`, most recently updated first
    fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Board>, BoardError>;

    fn get_by_room(&self, room_id: &str) -> Result<Option<Board>, BoardError>;

    /// Last saved snapshot of a room, if any
    fn load_board(&self, room_id: &str) -> Result<Option<Vec<RecordData>>, BoardError> {
        Ok(self.get_by_room(room_id)?.and_then(|b| b.board_data))
    }

    fn save_board(&self, room_id: &str, snapshot: &[RecordData]) -> Result<(), BoardError>;
}

/// One `<board id>.json` file per board
#[derive(Debug, Clone)]
pub struct FileBoardStore {
    dir: PathBuf,
}

impl FileBoardStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Every readable board; unreadable files are logged and skipped
    fn all(&self) -> Result<Vec<Board>, BoardError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut boards = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match read_board(&path) {
                    Ok(board) => boards.push(board),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable board file"),
                }
            }
        }
        Ok(boards)
    }

    fn write(&self, board: &Board) -> Result<(), BoardError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(board.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(board)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn owned(&self, owner: &UserId, room_id: &str) -> Result<Board, BoardError> {
        let board = self
            .get_by_room(room_id)?
            .ok_or_else(|| BoardError::NotFound(room_id.to_string()))?;
        if &board.owner_user_id != owner {
            return Err(BoardError::NotOwner {
                room_id: room_id.to_string(),
            });
        }
        Ok(board)
    }
}

fn read_board(path: &Path) -> Result<Board, BoardError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn clean_name(name: &str) -> Result<String, BoardError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BoardError::EmptyName);
    }
    Ok(name.to_string())
}

impl BoardStore for FileBoardStore {
    fn create(&self, owner: &UserId, name: &str, room_id: Option<&str>) -> Result<Board, BoardError> {
        let name = clean_name(name)?;
        let room_id = room_id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        if self.get_by_room(&room_id)?.is_some() {
            return Err(BoardError::RoomTaken(room_id));
        }
        let now = Utc::now();
        let board = Board {
            id: Uuid::new_v4(),
            room_id,
            name,
            board_data: None,
            owner_user_id: owner.clone(),
            created_at: now,
            updated_at: now,
        };
        self.write(&board)?;
        info!(room = %board.room_id, owner = %owner, "board created");
        Ok(board)
    }

    fn rename(&self, owner: &UserId, room_id: &str, name: &str) -> Result<Board, BoardError> {
        let mut board = self.owned(owner, room_id)?;
        board.name = clean_name(name)?;
        board.updated_at = Utc::now();
        self.write(&board)?;
        info!(room = room_id, name = %board.name, "board renamed");
        Ok(board)
    }

    fn delete(&self, owner: &UserId, room_id: &str) -> Result<(), BoardError> {
        let board = self.owned(owner, room_id)?;
        fs::remove_file(self.path_for(board.id))?;
        info!(room = room_id, "board deleted");
        Ok(())
    }

    fn list_for_owner(&self, owner: &UserId) -> Result<Vec<Board>, BoardError> {
        let mut boards: Vec<Board> = self
            .all()?
            .into_iter()
            .filter(|b| &b.owner_user_id == owner)
            .collect();
        boards.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(boards)
    }

    fn get_by_room(&self, room_id: &str) -> Result<Option<Board>, BoardError> {
        Ok(self.all()?.into_iter().find(|b| b.room_id == room_id))
    }

    fn save_board(&self, room_id: &str, snapshot: &[RecordData]) -> Result<(), BoardError> {
        let mut board = self
            .get_by_room(room_id)?
            .ok_or_else(|| BoardError::NotFound(room_id.to_string()))?;
        board.board_data = Some(snapshot.to_vec());
        board.updated_at = Utc::now();
        self.write(&board)?;
        debug!(room = room_id, shapes = snapshot.len(), "board saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkboard_core::Attributes;

    fn store() -> (tempfile::TempDir, FileBoardStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBoardStore::new(dir.path().join("boards"));
        (dir, store)
    }

    #[test]
    fn create_and_list() {
        let (_dir, store) = store();
        let ada = UserId::new("ada");
        let bob = UserId::new("bob");
        assert!(store.list_for_owner(&ada).unwrap().is_empty());

        let first = store.create(&ada, "  Sketches ", None).unwrap();
        assert_eq!(first.name, "Sketches");
        store.create(&ada, "Plans", Some("plans-room")).unwrap();
        store.create(&bob, "Bob's", None).unwrap();

        let names: Vec<_> = store.list_for_owner(&ada).unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Plans".to_string()));
        assert!(store.get_by_room("plans-room").unwrap().is_some());
    }

    #[test]
    fn room_ids_are_unique() {
        let (_dir, store) = store();
        let ada = UserId::new("ada");
        store.create(&ada, "One", Some("r")).unwrap();
        assert!(matches!(store.create(&ada, "Two", Some("r")), Err(BoardError::RoomTaken(_))));
        assert!(matches!(store.create(&ada, " ", None), Err(BoardError::EmptyName)));
    }

    #[test]
    fn only_owner_may_rename_or_delete() {
        let (_dir, store) = store();
        let ada = UserId::new("ada");
        let eve = UserId::new("eve");
        store.create(&ada, "Mine", Some("r")).unwrap();

        assert!(matches!(store.rename(&eve, "r", "Hijacked"), Err(BoardError::NotOwner { .. })));
        assert!(matches!(store.delete(&eve, "r"), Err(BoardError::NotOwner { .. })));
        assert!(matches!(store.delete(&ada, "nope"), Err(BoardError::NotFound(_))));

        assert_eq!(store.rename(&ada, "r", "Renamed").unwrap().name, "Renamed");
        store.delete(&ada, "r").unwrap();
        assert!(store.get_by_room("r").unwrap().is_none());
    }

    #[test]
    fn snapshots_round_trip() {
        let (_dir, store) = store();
        let ada = UserId::new("ada");
        store.create(&ada, "B", Some("r")).unwrap();
        assert_eq!(store.load_board("r").unwrap(), None);

        let snapshot = vec![RecordData {
            id: "s1".into(),
            shape_type: "circle".into(),
            owner_connection_id: 2,
            attributes: Attributes::new(),
        }];
        store.save_board("r", &snapshot).unwrap();
        assert_eq!(store.load_board("r").unwrap(), Some(snapshot));
        assert!(matches!(store.save_board("missing", &[]), Err(BoardError::NotFound(_))));
    }

    #[test]
    fn corrupt_board_file_is_skipped() {
        let (_dir, store) = store();
        let ada = UserId::new("ada");
        store.create(&ada, "Good", Some("good")).unwrap();
        fs::write(store.dir().join("broken.json"), "not json").unwrap();
        fs::write(store.dir().join("half.json"), r#"{"id": "#).unwrap();

        let boards = store.list_for_owner(&ada).unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(boards[0].room_id, "good");
        assert!(store.get_by_room("good").unwrap().is_some());
        store.create(&ada, "Another", Some("other")).unwrap();
        assert_eq!(store.list_for_owner(&ada).unwrap().len(), 2);
    }
}
