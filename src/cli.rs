use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "meera",
    version,
    about = "Hive-mind conversational companion with long-term memory"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat session in the terminal
    Chat {
        /// User id the conversation (and its memories) belong to
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Run the HTTP gateway
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Inspect and manage the memory subsystem
    Memory {
        #[command(subcommand)]
        command: MemoryCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum MemoryCommand {
    /// Backend health and per-scope record counts
    Status {
        /// Also report this user's personal memory count
        #[arg(long)]
        user: Option<String>,
    },
    /// Query memories the way a conversation turn would
    Recall {
        #[arg(long)]
        user: String,
        /// Query text
        query: String,
        /// Search the shared hive-mind corpus instead of personal memories
        #[arg(long)]
        hive: bool,
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
    /// Store a memory directly, bypassing extraction
    Remember {
        #[arg(long)]
        user: String,
        /// Memory content
        content: String,
        /// One of: personal_identity, preference, factual, emotional_state
        #[arg(long, default_value = "factual")]
        memory_type: String,
        /// Optional tags (repeatable)
        #[arg(long)]
        tag: Vec<String>,
    },
    /// Publish an insight into the shared hive-mind corpus
    Share {
        #[arg(long)]
        user: String,
        /// Memory content
        content: String,
        /// One of: personal_identity, preference, factual, emotional_state
        #[arg(long, default_value = "factual")]
        memory_type: String,
    },
}
