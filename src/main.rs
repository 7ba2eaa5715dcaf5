mod script;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use inkboard_core::{adapter, ToolState};
use inkboard_session::{BoardError, BoardStore, Config, FileBoardStore, UserId};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Collaborative whiteboard boards from the command line
#[derive(Parser, Debug)]
#[command(name = "inkboard")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage your boards
    Boards {
        #[command(subcommand)]
        command: BoardsCommand,
    },

    /// Replay a JSON gesture script into a board's room and save it
    Replay {
        room: String,
        script: PathBuf,

        /// Number of peers joining the room
        #[arg(long, default_value_t = 1)]
        peers: usize,
    },

    /// Export a board's last saved snapshot
    Export {
        room: String,

        #[command(flatten)]
        target: ExportTarget,
    },
}

#[derive(Subcommand, Debug)]
enum BoardsCommand {
    /// List your boards, most recently updated first
    List,

    /// Create a board
    Create {
        name: String,

        /// Room id to use instead of a generated one
        #[arg(long)]
        room: Option<String>,
    },

    Rename { room: String, name: String },

    Delete { room: String },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct ExportTarget {
    /// Write an SVG drawing
    #[arg(long, value_name = "PATH")]
    svg: Option<PathBuf>,

    /// Write a JSON snapshot
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Missing credentials are fatal before anything else runs
    let config = Config::load()?;
    let boards = FileBoardStore::new(config.boards_dir());
    let user = UserId::new(config.user_id.clone());

    match cli.command {
        Command::Boards { command } => run_boards(&boards, &user, command),
        Command::Replay { room, script, peers } => {
            let steps = script::load(&script)?;
            let shapes = script::replay(&boards, &config, &room, &steps, peers)?;
            println!("{room}: {shapes} shape(s) after {} step(s)", steps.len());
            Ok(())
        }
        Command::Export { room, target } => export(&boards, &config, &room, target),
    }
}

fn run_boards(boards: &FileBoardStore, user: &UserId, command: BoardsCommand) -> Result<()> {
    match command {
        BoardsCommand::List => {
            for board in boards.list_for_owner(user)? {
                let shapes = board.board_data.as_ref().map_or(0, Vec::len);
                println!(
                    "{}\t{}\t{} shape(s)\t{}",
                    board.room_id,
                    board.name,
                    shapes,
                    board.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        BoardsCommand::Create { name, room } => {
            let board = boards.create(user, &name, room.as_deref())?;
            println!("{}", board.room_id);
        }
        BoardsCommand::Rename { room, name } => {
            boards.rename(user, &room, &name)?;
        }
        BoardsCommand::Delete { room } => {
            boards.delete(user, &room)?;
        }
    }
    Ok(())
}

fn export(boards: &FileBoardStore, config: &Config, room: &str, target: ExportTarget) -> Result<()> {
    let board = boards
        .get_by_room(room)?
        .ok_or_else(|| BoardError::NotFound(room.to_string()))?;
    let records = board.board_data.unwrap_or_default();

    if let Some(path) = target.svg {
        let tool_config = ToolState::new(config.default_tool, config.brushes.clone()).config();
        let objects = adapter::deserialize(&records, &tool_config);
        inkboard_export::save_svg(&objects, &path).context("SVG export failed")?;
        info!(room, path = %path.display(), shapes = objects.len(), "exported SVG");
    }
    if let Some(path) = target.json {
        inkboard_export::save_json(&board.room_id, &board.name, &records, &path).context("JSON export failed")?;
        info!(room, path = %path.display(), shapes = records.len(), "exported JSON");
    }
    Ok(())
}
