// src/main.rs

use chrono::Local;
use clap::{Parser, Subcommand};
use cyber_tutor::models::ChapterType;
use cyber_tutor::pedagogy::format_elapsed;
use cyber_tutor::profile::require_user;
use cyber_tutor::{
    AttemptOutcome, Catalog, ContentSource, DocumentStore, MemoryStore, Profiles, Progression,
    Result, SqliteStore, StaticAuth, Submission, TutorConfig, TutorError,
};
use log::{error, info, warn};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DB_FILE: &str = "cyber_tutor.db";

#[derive(Parser)]
#[command(name = "cyber-tutor", version, about = "Cyber Tutor lessons, quizzes and progress")]
struct Cli {
    /// SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,

    /// Keep everything in memory (nothing is saved)
    #[arg(long, conflicts_with = "db")]
    memory: bool,

    /// JSON config file (overrides CYBER_TUTOR_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Lesson catalog JSON (defaults to the bundled lessons)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Signed-in user id
    #[arg(long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the learner's records
    Register {
        #[arg(long)]
        name: String,
    },
    /// Record today's login and show the streak
    Login,
    /// Show rank and chapter progress
    Status { topic: Option<String> },
    /// Take a chapter assessment
    Quiz { chapter: String },
    /// Mark a content chapter as read
    Read {
        chapter: String,
        #[arg(long, default_value_t = 0)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => TutorConfig::from_file(path)?,
        None => TutorConfig::load()?,
    };

    let store: Arc<dyn DocumentStore> = if cli.memory {
        warn!("Running with an in-memory store; progress will not be saved");
        Arc::new(MemoryStore::new())
    } else {
        let path = cli
            .db
            .clone()
            .or_else(|| config.database_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));
        Arc::new(SqliteStore::open(&path)?)
    };

    let catalog = match &cli.catalog {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::bundled()?,
    };
    let content: Arc<dyn ContentSource> = Arc::new(catalog);

    let auth = StaticAuth::new(cli.user.clone());
    let user_id = require_user(&auth)?;

    let progression = Progression::new(Arc::clone(&store), Arc::clone(&content), &config);
    let profiles = Profiles::new(store, content, config.retry_policy());
    info!("Starting Cyber Tutor for user {}", user_id);

    match cli.command {
        Command::Register { name } => {
            let profile = profiles
                .register_user(&user_id, &name, &mut rand::thread_rng())
                .await?;
            println!("Welcome, {}! You are in the {:?} group.", profile.name, profile.group);
        }
        Command::Login => {
            let streak = profiles
                .record_login_in_background(&user_id, Local::now().date_naive())
                .await?;
            match streak {
                Some(s) => println!("Streak: {} day(s) (best {})", s.current, s.longest),
                None => println!("Streak could not be updated right now."),
            }
        }
        Command::Status { topic } => print_status(&progression, &user_id, topic).await?,
        Command::Quiz { chapter } => run_quiz(&progression, &user_id, &chapter).await?,
        Command::Read { chapter, seconds } => {
            let newly = progression
                .complete_content_chapter(&user_id, &chapter, Duration::from_secs(seconds))
                .await?;
            if newly {
                println!("Chapter {} complete.", chapter);
            } else {
                println!("Chapter {} was already complete; visit recorded.", chapter);
            }
        }
    }
    Ok(())
}

async fn print_status(progression: &Progression, user_id: &str, topic: Option<String>) -> Result<()> {
    let topics = match topic {
        Some(id) => vec![progression.content().topic(&id).await?],
        None => progression.content().topics().await?,
    };

    for topic in &topics {
        let rank = progression.proficiency().get_rank(user_id, &topic.id).await?;
        println!("{} [{}] ({})", topic.title, topic.id, rank);
        for status in progression.chapter_statuses(user_id, &topic.id).await? {
            let lock = if status.unlocked { " " } else { "🔒" };
            let done = if status.complete { "✅" } else { "❌" };
            let kind = match status.chapter_type {
                ChapterType::Content => "read",
                ChapterType::Assessment => "quiz",
            };
            println!(
                "  {} {} {}. {} [{}] ({})",
                lock, done, status.order, status.title, status.chapter_id, kind
            );
        }
    }
    println!(
        "Topics completed: {}",
        progression.topics_completed(user_id).await?
    );
    Ok(())
}

async fn run_quiz(progression: &Progression, user_id: &str, chapter_id: &str) -> Result<()> {
    let mut session = progression
        .start_quiz(user_id, chapter_id, &mut rand::thread_rng())
        .await?;
    if session.questions.is_empty() {
        println!("No questions are available at your level yet.");
        return Ok(());
    }

    let answers = prompt_answers(&session.questions)
        .map_err(|e| TutorError::Validation(format!("could not read answers: {}", e)))?;

    let mut result = progression.submit(&mut session, &answers).await;
    while let Err(e) = &result {
        if !e.is_retryable() || !confirm(&format!("Saving failed ({}). Retry?", e)) {
            break;
        }
        result = progression.retry_save(&mut session).await;
    }
    let outcome = result?;
    print_outcome(&outcome, session.elapsed());
    Ok(())
}

fn prompt_answers(questions: &[cyber_tutor::models::QuizQuestion]) -> io::Result<Submission> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut answers = Submission::new();

    for (i, q) in questions.iter().enumerate() {
        println!("\n{}. {}", i + 1, q.prompt);
        for (key, text) in &q.choices {
            println!("   {}) {}", key, text);
        }
        print!("> ");
        io::stdout().flush()?;
        let Some(line) = lines.next() else { break };
        let choice = line?.trim().to_ascii_lowercase();
        if !choice.is_empty() {
            answers.insert(q.id.clone(), choice);
        }
    }
    Ok(answers)
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    io::stdin().read_line(&mut line).is_ok() && line.trim().eq_ignore_ascii_case("y")
}

fn print_outcome(outcome: &AttemptOutcome, took: Duration) {
    let e = &outcome.evaluation;
    println!(
        "\nAttempt #{}: {:.2}% ({}/{}) in {} ({})",
        outcome.attempt_index,
        e.percentage,
        e.correct_count,
        e.total_questions,
        format_elapsed(took),
        if e.passed { "passed" } else { "failed" }
    );
    if outcome.newly_completed {
        println!("Chapter complete! Your level is now {}.", outcome.rank);
    }
    if let Some(next) = &outcome.next_chapter {
        println!("Next up: {}", next);
    }
    if outcome.retry_allowed {
        println!("Don't give up! You can try again any time.");
    }
}
