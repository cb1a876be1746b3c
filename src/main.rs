use clap::{Parser, Subcommand};
use post_reflection::{
    config::{Config, StoreBackend},
    rules::{load_rules, render_reflections_prompt, render_thread_reflections_prompt},
    run_reflection_graph,
    store::{open_store, StoreLocation, THREAD_REFLECTIONS_KEY},
    utils::init_tracing,
    FeedbackSession, NodeContext, ReflectionAgent, UpdateStrategy,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "post-reflection", version, about = "Update post-writing rules from user feedback")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reflection node once for a piece of feedback
    Reflect {
        /// The post the user gave feedback on
        #[arg(long)]
        original_post: String,
        /// The user's feedback
        #[arg(long)]
        feedback: String,
        /// The post after the user's edits
        #[arg(long)]
        revised_post: Option<String>,
        /// regenerate | propose
        #[arg(long)]
        strategy: Option<UpdateStrategy>,
        /// Update the thread rules instead of the post rules
        #[arg(long)]
        thread: bool,
    },
    /// Print the stored rules and the prompt block generators receive
    Show {
        #[arg(long)]
        thread: bool,
    },
}

fn location_for(config: &Config, thread: bool) -> StoreLocation {
    if thread {
        StoreLocation::new([config.reflection.namespace.clone()], THREAD_REFLECTIONS_KEY)
    } else {
        config.reflection.location()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        backend = ?config.store.backend,
        "Configuration loaded"
    );
    if config.store.backend == StoreBackend::Memory {
        warn!("Using the in-memory store; rules will not outlive this process");
    }

    let store = open_store(&config.store).await?;

    match cli.command {
        Command::Reflect {
            original_post,
            feedback,
            revised_post,
            strategy,
            thread,
        } => {
            let mut agent = ReflectionAgent::from_config(&config)?
                .with_location(location_for(&config, thread));
            if let Some(strategy) = strategy {
                agent = agent.with_strategy(strategy);
            }

            let mut session = FeedbackSession::new(original_post, feedback);
            if let Some(revised) = revised_post {
                session = session.with_revised_post(revised);
            }

            let ctx = NodeContext::with_store(store.clone());
            run_reflection_graph(&agent, &session, &ctx).await?;

            let rules = load_rules(&*store, agent.location()).await?;
            println!("{}", rules.to_prompt_text());
        }
        Command::Show { thread } => {
            let rules = load_rules(&*store, &location_for(&config, thread)).await?;
            let block = if thread {
                render_thread_reflections_prompt(&rules).unwrap_or_default()
            } else {
                render_reflections_prompt(&rules)
            };
            println!("{}\n\n{}", rules.to_prompt_text(), block);
        }
    }

    Ok(())
}
