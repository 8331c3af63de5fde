use anyhow::Result;
use bsky_agent::{account::DEFAULT_SERVER, Agent, AgentDir};
use clap::{Parser, Subcommand};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Command line client for a content-addressed social repository.
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// Agent directory. Defaults to `$BSKY_DIR` or the platform data directory.
    #[clap(long)]
    dir: Option<std::path::PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new identity and an empty repository.
    Init {
        name: String,
        #[clap(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Register the repository with the server.
    Register,
    /// Publish a post.
    Post { body: String },
    /// Follow another user by DID.
    Follow { did: String },
    /// Print the posts of a user, by default this one.
    List { id: Option<String> },
    /// Fetch the repository of a user by DID or name.
    Pull { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let dir = match cli.dir {
        Some(dir) => AgentDir::new(dir),
        None => AgentDir::from_env()?,
    };

    match cli.command {
        Command::Init { name, server } => {
            let agent = Agent::init(dir, &name, &server)?;
            println!("{}", agent.account().did);
        }
        Command::Register => {
            let root = Agent::open(dir)?.register().await?;
            println!("registered {root}");
        }
        Command::Post { body } => {
            let root = Agent::open(dir)?.post(&body).await?;
            println!("{root}");
        }
        Command::Follow { did } => {
            let root = Agent::open(dir)?.follow(&did).await?;
            println!("{root}");
        }
        Command::List { id } => {
            let agent = Agent::open(dir)?;
            let (user, posts) = agent.list(id.as_deref())?;
            println!("{} ({})", user.name, user.did);
            for did in &user.follows {
                println!("follows {did}");
            }
            for (i, post) in posts.iter().enumerate() {
                println!("[{i}] {} {}", post.timestamp, post.body);
            }
        }
        Command::Pull { id } => {
            let user = Agent::open(dir)?.pull(&id).await?;
            println!("{} ({}): {} posts", user.name, user.did, user.next_post);
        }
    }
    Ok(())
}
