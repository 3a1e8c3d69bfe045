use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use mia::cache::ResultSet;
use mia::pagination::{Accumulated, LoadMore};
use mia::search::{SearchItem, SearchKind, SearchOutcome};
use mia::session::{BrowserNavigator, Navigator, Session};
use mia::youtube::{Comment, Rating, SourceType, Video};
use mia::{Client, ClientError, Config};

#[derive(Parser, Debug)]
#[command(name = "mia")]
#[command(about = "A caching client for video, comment and blog/news search APIs")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./mia.yaml, then $XDG_CONFIG_HOME/mia/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  /// Print the facade state as JSON
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List the videos of a channel or playlist
  Videos {
    /// channel or playlist
    source_type: SourceType,
    id: String,
  },
  /// Show comments on a video
  Comments {
    video_id: String,
    #[arg(long, conflicts_with = "all")]
    page_token: Option<String>,
    /// Follow every page
    #[arg(long)]
    all: bool,
  },
  /// Post a comment on a video
  Comment { video_id: String, text: String },
  /// Reply to a comment
  Reply {
    video_id: String,
    parent_id: String,
    text: String,
  },
  /// Rate a video (like, dislike or none)
  Rate { video_id: String, rating: Rating },
  /// Search blog posts
  Blog {
    #[command(flatten)]
    search: SearchArgs,
    /// Archive the results server-side under this key
    #[arg(long)]
    archive: Option<String>,
  },
  /// Search news articles
  News {
    #[command(flatten)]
    search: SearchArgs,
  },
  /// Show the latest results archived under a key
  Docs {
    key: String,
    /// Skip the cache
    #[arg(long)]
    refresh: bool,
  },
  /// Sign in through the browser
  Login,
  /// Finish signing in with the URL the browser was redirected to
  Callback { url: Url },
  /// Sign out and forget the stored token
  Logout,
  /// Show whether a session is active
  Whoami,
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
  /// One or more queries, run in order
  #[arg(required = true)]
  queries: Vec<String>,
  #[arg(long, default_value_t = 1)]
  start: u32,
  /// Page size (default from config)
  #[arg(long)]
  display: Option<u32>,
  /// Load this many further pages of the last query
  #[arg(long, default_value_t = 0)]
  more: u32,
  /// Print the search history afterwards
  #[arg(long)]
  history: bool,
}

/// Opens the browser when it can and always prints the URL.
struct CliNavigator;

impl Navigator for CliNavigator {
  fn navigate(&self, url: &Url) -> Result<(), ClientError> {
    if let Err(e) = BrowserNavigator.navigate(url) {
      tracing::warn!(error = %e, "could not open the browser");
    }
    eprintln!("Open this URL to sign in:\n\n  {}\n", url);
    Ok(())
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_file.as_deref())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let client = Client::from_config(&config)?;

  run(&client, &config, args.command, args.json).await
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mia=info"));

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
      Ok(None)
    }
  }
}

async fn run(client: &Client, config: &Config, command: Command, json: bool) -> Result<()> {
  match command {
    Command::Videos { source_type, id } => {
      let result = client.videos().list_videos(source_type, &id).await;
      if json {
        return report(&client.videos().snapshot(), result);
      }
      let videos = result?;
      print_videos(&videos);
    }

    Command::Comments {
      video_id,
      page_token,
      all,
    } => {
      if all {
        let thread = load_whole_thread(client, &video_id).await;
        if json {
          return match thread {
            Ok(thread) => print_json(&thread),
            Err(e) => report(&client.comments().snapshot(), Err::<(), _>(e)),
          };
        }
        print_comments(&thread?.items);
      } else {
        let result = client
          .comments()
          .list_comments(&video_id, page_token.as_deref())
          .await;
        if json {
          return report(&client.comments().snapshot(), result);
        }
        let page = result?;
        print_comment_page(&page);
      }
    }

    Command::Comment { video_id, text } => {
      let result = client.comments().post_comment(&video_id, &text).await;
      if json {
        return report(&client.comments().snapshot(), result);
      }
      result?;
      println!("Comment posted.");
    }

    Command::Reply {
      video_id,
      parent_id,
      text,
    } => {
      let result = client
        .comments()
        .reply_to_comment(&video_id, &parent_id, &text)
        .await;
      if json {
        return report(&client.comments().snapshot(), result);
      }
      result?;
      println!("Reply posted.");
    }

    Command::Rate { video_id, rating } => {
      let result = client.videos().rate_video(&video_id, rating).await;
      if json {
        return report(&client.videos().snapshot(), result);
      }
      result?;
      println!("Rated {} as {}.", video_id, rating);
    }

    Command::Blog { search, archive } => {
      let display = search.display.unwrap_or(config.search.blog_display);
      run_searches(client, SearchKind::Blog, &search, display, archive.as_deref(), json).await?;
    }

    Command::News { search } => {
      let display = search.display.unwrap_or(config.search.news_display);
      run_searches(client, SearchKind::News, &search, display, None, json).await?;
    }

    Command::Docs { key, refresh } => {
      let result = if refresh {
        client.documents().refresh(&key).await
      } else {
        client.documents().fetch_cached_results(&key).await
      };
      if json {
        return report(&client.documents().snapshot(), result);
      }
      print_search_items(&result?.items);
    }

    Command::Login => {
      client.auth().initiate_oauth(&CliNavigator)?;
      eprintln!("Paste the URL you were redirected to:");
      let mut line = String::new();
      BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
      let callback =
        Url::parse(line.trim()).map_err(|e| eyre!("Invalid redirect URL: {}", e))?;
      let session = client.auth().complete_oauth_callback(&callback).await?;
      print_session(&session, json)?;
    }

    Command::Callback { url } => {
      let session = client.auth().complete_oauth_callback(&url).await?;
      print_session(&session, json)?;
    }

    Command::Logout => {
      client.auth().logout()?;
      println!("Signed out.");
    }

    Command::Whoami => {
      print_session(&client.auth().session(), json)?;
    }
  }

  Ok(())
}

async fn load_whole_thread(
  client: &Client,
  video_id: &str,
) -> Result<Accumulated<Comment>, ClientError> {
  let comments = client.comments();
  let mut thread = comments.open_thread(video_id).await?;
  while comments.has_more_comments(video_id) {
    match comments.load_more_comments(video_id).await? {
      LoadMore::Merged(next) => thread = next,
      LoadMore::InFlight | LoadMore::Exhausted | LoadMore::Superseded => break,
    }
  }
  Ok(thread)
}

async fn run_searches(
  client: &Client,
  kind: SearchKind,
  args: &SearchArgs,
  display: u32,
  archive: Option<&str>,
  json: bool,
) -> Result<()> {
  let search = client.search();

  for query in &args.queries {
    let result = match archive {
      Some(key) => {
        search
          .search_blog_archived(key, query, args.start, display)
          .await
      }
      None => search.search(kind, query, args.start, display).await,
    };
    if json {
      print_json(&search.snapshot())?;
      result?;
      continue;
    }
    match result? {
      SearchOutcome::Results(results) => {
        println!(
          "{} results for \"{}\" ({} total)",
          kind, results.query, results.total
        );
        print_search_items(&results.items);
      }
      SearchOutcome::NoResults { query, .. } => println!("No {} results for \"{}\"", kind, query),
    }
  }

  if let Some(last) = args.queries.last() {
    let mut loaded = None;
    for _ in 0..args.more {
      if !search.has_more(kind, last) {
        break;
      }
      if let LoadMore::Merged(accumulated) = search.load_more(kind, last).await? {
        loaded = Some(accumulated);
      }
    }
    if let Some(accumulated) = loaded {
      if json {
        print_json(&accumulated)?;
      } else {
        println!(
          "\nLoaded {} of {} for \"{}\"",
          accumulated.display,
          accumulated.total.unwrap_or(0),
          last
        );
        print_search_items(&accumulated.items);
      }
    }
  }

  if args.history {
    let history = search.history();
    if json {
      print_json(&history)?;
    } else {
      println!("\nRecent searches:");
      for entry in history {
        println!(
          "  {}  {:<30} {} of {}",
          entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
          entry.query,
          entry.result_count,
          entry.total_count
        );
      }
    }
  }

  Ok(())
}

/// Print a facade snapshot, then fail if the operation did.
fn report<T: Serialize, U>(snapshot: &T, result: Result<U, ClientError>) -> Result<()> {
  print_json(snapshot)?;
  result?;
  Ok(())
}

fn print_json(value: &impl Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn print_session(session: &Session, json: bool) -> Result<()> {
  if json {
    return print_json(&serde_json::json!({
      "isAuthenticated": session.is_authenticated,
    }));
  }
  if session.is_authenticated {
    println!("Signed in.");
  } else {
    println!("Not signed in.");
  }
  Ok(())
}

fn print_videos(videos: &ResultSet<Video>) {
  if videos.is_empty() {
    println!("No videos.");
    return;
  }
  for video in &videos.items {
    println!("{}  {}  {}", video.id, video.published_at, video.title);
  }
}

fn print_comment_page(page: &ResultSet<Comment>) {
  print_comments(&page.items);
  if let Some(token) = &page.next_page_token {
    println!("\nNext page: --page-token {}", token);
  }
}

fn print_comments(comments: &[Comment]) {
  if comments.is_empty() {
    println!("No comments.");
    return;
  }
  for comment in comments {
    println!("[{}] {} ({}):\n  {}", comment.id, comment.author, comment.published_at, comment.text);
  }
}

fn print_search_items(items: &[SearchItem]) {
  for item in items {
    println!("- {}\n  {}", item.title, item.link);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cli_definition_is_valid() {
    use clap::CommandFactory;
    Args::command().debug_assert();
  }

  #[test]
  fn test_parses_search_flags() {
    let args = Args::try_parse_from([
      "mia", "--json", "blog", "cats", "dogs", "--start", "11", "--more", "2", "--archive", "weekly",
    ])
    .unwrap();

    assert!(args.json);
    let Command::Blog { search, archive } = args.command else {
      panic!("expected blog command");
    };
    assert_eq!(search.queries, vec!["cats", "dogs"]);
    assert_eq!(search.start, 11);
    assert_eq!(search.display, None);
    assert_eq!(search.more, 2);
    assert_eq!(archive.as_deref(), Some("weekly"));
  }

  #[test]
  fn test_parses_video_source_and_rating() {
    let args = Args::try_parse_from(["mia", "videos", "playlist", "PL123"]).unwrap();
    assert!(matches!(
      args.command,
      Command::Videos { source_type: SourceType::Playlist, ref id } if id == "PL123"
    ));

    let args = Args::try_parse_from(["mia", "rate", "v1", "like"]).unwrap();
    assert!(matches!(args.command, Command::Rate { rating: Rating::Like, .. }));

    assert!(Args::try_parse_from(["mia", "rate", "v1", "love"]).is_err());
  }

  #[test]
  fn test_page_token_conflicts_with_all() {
    let result = Args::try_parse_from(["mia", "comments", "v1", "--page-token", "CAE", "--all"]);
    assert!(result.is_err());
  }

  #[test]
  fn test_search_requires_a_query() {
    assert!(Args::try_parse_from(["mia", "news"]).is_err());
  }
}
