use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use colored::*;

use chatsense::config::Config;
use chatsense::core::{
    extract_key_updates, participant_context, ConversationPayload, ConversationProcessor, ExportParser,
    ProfileStore, SqliteStore,
};

pub use commands::{Args, Commands};

mod commands;

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::new(config.database_path())
        .with_context(|| format!("Failed to open database: {}", config.database_path().display()))
}

pub fn handle_parse(file: &Path, data_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::new(data_dir)?;
    let result = ExportParser::new(config.keywords)
        .parse_file(file)
        .with_context(|| format!("Failed to parse export: {}", file.display()))?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub fn handle_process(file: &Path, data_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::new(data_dir)?;
    let store = open_store(&config)?;

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let payload: ConversationPayload = serde_json::from_str(&content)
        .context("Failed to parse conversation payload JSON")?;

    println!("{}", "🚀 Processing conversation...".cyan().bold());
    println!("Platform: {}", payload.platform.yellow());

    let outcome = ConversationProcessor::new(&store, &store, &store, &config.keywords)
        .process_conversation(&payload)?;

    println!("\n{}", "📊 Processing Statistics".green().bold());
    println!("Session: {}", outcome.session_id.cyan());
    println!("Messages: {}", outcome.total_messages.to_string().cyan());
    println!("Participants: {}", outcome.participants.join(", ").yellow());
    println!("Profiles written: {}", outcome.profiles_created_count.to_string().cyan());
    if let Some(range) = outcome.date_range {
        println!("Date range: {} → {}", range.start_date, range.end_date);
    }

    println!("\n{}", "✅ Conversation processed successfully!".green().bold());
    Ok(())
}

pub fn handle_profiles(main_user: &str, platform: Option<&str>, data_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::new(data_dir)?;
    let store = open_store(&config)?;

    let profiles = store.list_by_main_user(main_user, platform)?;
    if profiles.is_empty() {
        println!("No profiles found.");
        return Ok(());
    }

    println!("👥 Profiles ({}):", profiles.len());
    for stored in profiles {
        let p = stored.profile;
        let traits: Vec<String> = p.personality_traits.iter().map(|t| t.to_string()).collect();
        let topics: Vec<String> = p.preferred_topics.iter().map(|t| t.to_string()).collect();
        println!(
            "  {} [{}] - {} (Frequency: {:.2}, Trust: {:.2})",
            p.username.bold(),
            p.platform,
            p.relationship_type.to_string().yellow(),
            p.frequency_score,
            p.trust_score
        );
        if !traits.is_empty() {
            println!("      traits: {}", traits.join(", "));
        }
        if !topics.is_empty() {
            println!("      topics: {}", topics.join(", "));
        }
    }

    Ok(())
}

pub fn handle_context(
    participant: &str,
    main_user: &str,
    platform: Option<&str>,
    data_dir: Option<PathBuf>,
) -> Result<()> {
    let config = Config::new(data_dir)?;
    let store = open_store(&config)?;

    let context = participant_context(&store, main_user, participant, platform)?;
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}

pub fn handle_updates(file: &Path, limit: usize, data_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::new(data_dir)?;
    let result = ExportParser::new(config.keywords)
        .parse_file(file)
        .with_context(|| format!("Failed to parse export: {}", file.display()))?;

    let updates = extract_key_updates(&result.messages, limit);
    if updates.is_empty() {
        println!("No key updates found.");
        return Ok(());
    }

    println!("📌 Key updates ({}):", updates.len());
    for update in updates {
        println!(
            "  {} {}: {}",
            update.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            update.sender.yellow(),
            update.content
        );
    }
    Ok(())
}
