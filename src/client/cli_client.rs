use clap::{Parser, Subcommand};
use empathy_client::client::config::ClientConfig;
use empathy_client::client::models::feed::{self, FeedState, SearchOutcome, SortOrder, DEFAULT_PAGE_SIZE};
use empathy_client::client::models::forms;
use empathy_client::client::models::moderation::report_menu_entry_for_status;
use empathy_client::client::services::admin_service::AdminService;
use empathy_client::client::services::api::ApiClient;
use empathy_client::client::services::interactions::{report_status_key, Mutation, PostInteractions};
use empathy_client::client::services::live_updates::LiveState;
use empathy_client::client::services::message_parser::EventKind;
use empathy_client::client::services::query_cache::QueryCache;
use empathy_client::client::services::websocket_client::{ChannelClient, ConnectionStatus};
use empathy_client::client::utils::analytics::Analytics;
use empathy_client::client::utils::error_log::{ErrorKind, ErrorLog};
use empathy_client::client::utils::session::SessionStore;
use empathy_client::client::utils::session_store::TokenVault;
use empathy_client::client::utils::storage::{FileStorage, MemoryStorage, Storage};
use empathy_client::common::error::ApiError;
use empathy_client::common::models::{ContentType, NewComment, NewReport, Post, ReportStatus};
use empathy_client::utils::logger::EmpathyLogger;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "empathy")]
#[command(about = "Terminal client for the Empathy community")]
struct Cli {
    /// Overrides EMPATHY_API_URL
    #[arg(long, global = true)]
    api_url: Option<String>,
    /// Overrides EMPATHY_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in; the password is read from stdin
    Login { email: String },
    Logout,
    Whoami,
    Feed {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value = "newest")]
        sort: SortOrder,
    },
    Search { query: Vec<String> },
    Show { post_id: String },
    Like {
        post_id: String,
        #[arg(long)]
        undo: bool,
    },
    Save {
        post_id: String,
        #[arg(long)]
        undo: bool,
    },
    Comment { post_id: String, text: Vec<String> },
    Report {
        post_id: String,
        reason: String,
        #[arg(long)]
        details: Option<String>,
    },
    Notifications {
        #[arg(long)]
        mark_read: bool,
    },
    /// Prints live events until interrupted
    Listen {
        #[arg(long = "room")]
        rooms: Vec<String>,
    },
    #[command(subcommand)]
    Admin(AdminCommand),
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
    Reports {
        #[arg(long)]
        status: Option<String>,
    },
    Users {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    Stats,
    Resolve {
        report_id: String,
        #[arg(long)]
        note: Option<String>,
    },
    Reject {
        report_id: String,
        #[arg(long)]
        note: Option<String>,
    },
    Broadcast { message: Vec<String> },
}

struct App {
    config: ClientConfig,
    api: ApiClient,
    cache: QueryCache,
    errors: ErrorLog,
    analytics: Analytics,
}

fn parse_report_status(raw: &str) -> anyhow::Result<ReportStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(ReportStatus::Pending),
        "solved" => Ok(ReportStatus::Solved),
        "rejected" => Ok(ReportStatus::Rejected),
        other => Err(anyhow::anyhow!("unknown report status '{}'", other)),
    }
}

fn print_post(post: &Post) {
    let author = post.user_id.username().unwrap_or_else(|| post.user_id.id());
    println!("[{}] {} by {} ({} likes, {} views)", post.id, post.title, author, post.like_count, post.view_count);
    if !post.tags.is_empty() {
        println!("    #{}", post.tags.join(" #"));
    }
}

async fn read_line() -> anyhow::Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

impl App {
    fn new(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = ClientConfig::from_env();
        if let Some(url) = &cli.api_url {
            config.api_url = url.clone();
        }
        if let Some(dir) = &cli.data_dir {
            config.data_dir = dir.clone();
        }

        let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(config.data_dir.join("local_storage.json"))?);
        let session = SessionStore::new(storage.clone())
            .with_vault(TokenVault::new(&config.data_dir, config.keyring_fallback));
        let api = ApiClient::new(&config, session.clone())?;
        let errors = ErrorLog::from_config(storage, &config).with_session(session.clone());
        errors.install_panic_hook();
        let analytics = Analytics::new(&config, Arc::new(MemoryStorage::new())).with_session(session);

        Ok(Self {
            cache: QueryCache::new(config.cache_ttl()),
            config,
            api,
            errors,
            analytics,
        })
    }

    fn require_login(&self) -> Result<(), ApiError> {
        if self.api.session().is_authenticated() {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    async fn run(&self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::Login { email } => {
                forms::validate_email(&email)?;
                eprint!("Password: ");
                let password = read_line().await?;
                let session = self.api.sign_in(email.trim(), &password).await?;
                println!("Signed in as {}", session.user.username);
            }
            Command::Logout => {
                self.api.sign_out()?;
                self.cache.clear();
                println!("Signed out");
            }
            Command::Whoami => match self.api.session().user() {
                Some(user) => println!("{} <{}>{}", user.username, user.email, if user.is_admin() { " [admin]" } else { "" }),
                None => println!("Not signed in"),
            },
            Command::Feed { page, sort } => {
                self.analytics.page_view("/feed");
                let result = self.api.list_posts(page, DEFAULT_PAGE_SIZE, sort).await?;
                let total_pages = result.total_pages;
                let mut state = FeedState::new(sort, DEFAULT_PAGE_SIZE);
                state.absorb(result);
                if state.posts().is_empty() {
                    println!("No posts yet");
                }
                state.posts().iter().for_each(print_post);
                let pages = feed::page_window(page, total_pages, 5);
                println!("Pages: {:?} of {}", pages, feed::page_count(total_pages));
            }
            Command::Search { query } => {
                let query = query.join(" ");
                self.analytics.track("search", serde_json::json!({ "query": query }));
                match feed::search(&self.api, &query).await? {
                    SearchOutcome::Results(posts) => posts.iter().for_each(print_post),
                    outcome @ SearchOutcome::NoResults => {
                        println!("{}", outcome.empty_state_message().unwrap_or_default())
                    }
                }
            }
            Command::Show { post_id } => {
                self.analytics.page_view(&format!("/posts/{}", post_id));
                let post = self.api.get_post(&post_id).await?;
                print_post(&post);
                println!("\n{}\n", post.content);
                if self.api.session().is_authenticated() {
                    let interactions = PostInteractions::load(&self.api, Some(&self.cache), &post_id).await?;
                    let state = interactions.state();
                    println!(
                        "liked: {}  saved: {}  comments: {}",
                        state.is_liked, state.is_saved, state.comment_count
                    );
                    // Cached by the load above, so no second request.
                    let status = self
                        .cache
                        .get_or_fetch(&report_status_key(&post_id), || {
                            let api = self.api.clone();
                            let id = post_id.clone();
                            async move { api.report_status(ContentType::Post, &id).await }
                        })
                        .await?;
                    let entry = report_menu_entry_for_status(Some(&status));
                    println!("{}{}", entry.label, if entry.checked { " \u{2713}" } else { "" });
                }
                for comment in self.api.comments_for_post(&post_id).await? {
                    let author = comment.user_id.username().unwrap_or_else(|| comment.user_id.id());
                    println!("  - {}: {}", author, comment.content);
                }
            }
            Command::Like { post_id, undo } => {
                let mutation = if undo { Mutation::Unlike } else { Mutation::Like };
                let state = self.interact(&post_id, mutation).await?;
                println!("{} likes{}", state.like_count, if state.is_liked { " (liked)" } else { "" });
            }
            Command::Save { post_id, undo } => {
                let mutation = if undo { Mutation::Unsave } else { Mutation::Save };
                let state = self.interact(&post_id, mutation).await?;
                println!("{}", if state.is_saved { "Saved" } else { "Not saved" });
            }
            Command::Comment { post_id, text } => {
                let comment = NewComment { post_id: post_id.clone(), content: text.join(" ") };
                if comment.content.trim().is_empty() {
                    return Err(forms::ValidationError::Required("Comment").into());
                }
                let state = self.interact(&post_id, Mutation::Comment(comment)).await?;
                println!("Comment posted ({} total)", state.comment_count);
            }
            Command::Report { post_id, reason, details } => {
                let report = NewReport {
                    content_type: ContentType::Post,
                    content_id: post_id.clone(),
                    reason,
                    details,
                };
                forms::validate_report(&report)?;
                self.interact(&post_id, Mutation::Report(report)).await?;
                println!("Report submitted");
            }
            Command::Notifications { mark_read } => {
                self.require_login()?;
                let notifications = self.api.notifications().await?;
                if notifications.is_empty() {
                    println!("No notifications");
                }
                for n in &notifications {
                    println!("{} [{:?}] {}", if n.is_read { " " } else { "*" }, n.kind, n.content);
                }
                if mark_read && notifications.iter().any(|n| !n.is_read) {
                    self.api.mark_all_notifications_read().await?;
                }
            }
            Command::Listen { rooms } => self.listen(rooms).await?,
            Command::Admin(cmd) => self.admin(cmd).await?,
        }
        Ok(())
    }

    async fn interact(
        &self,
        post_id: &str,
        mutation: Mutation,
    ) -> Result<empathy_client::client::services::interactions::InteractionState, ApiError> {
        self.require_login()?;
        let interactions = PostInteractions::load(&self.api, Some(&self.cache), post_id).await?;
        let name = format!("{:?}", mutation.kind()).to_lowercase();
        let state = interactions.execute(&self.api, Some(&self.cache), mutation).await?;
        self.analytics.track(&name, serde_json::json!({ "post_id": post_id }));
        Ok(state)
    }

    async fn listen(&self, rooms: Vec<String>) -> anyhow::Result<()> {
        if !self.config.features.websocket {
            anyhow::bail!("Real-time updates are disabled (set ENABLE_WEBSOCKET=true)");
        }
        self.require_login()?;
        let session = self.api.session();
        let (Some(user_id), Some(token)) = (session.user_id(), session.token()) else {
            return Err(ApiError::Unauthorized.into());
        };

        let client = ChannelClient::new(self.config.socket_url.clone());
        let live = LiveState::new();
        live.attach(&client);
        let pruner = live.spawn_pruner();
        for kind in EventKind::ALL {
            client.on(kind, move |event| println!("[{}] {:?}", kind.as_str(), event));
        }

        let mut status = client.subscribe_status();
        if let Err(e) = client.connect(&user_id, &token).await {
            self.errors.capture(ErrorKind::Channel, e.to_string(), serde_json::json!({ "url": self.config.socket_url }));
            pruner.abort();
            return Err(e.into());
        }
        for room in &rooms {
            client.join_room(room).await;
        }
        println!("Listening, press Ctrl+C to stop");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *status.borrow_and_update();
                    println!("[status] {}", current.as_str());
                    if current == ConnectionStatus::ReconnectFailed {
                        self.errors.capture(ErrorKind::Channel, "reconnect attempts exhausted", serde_json::Value::Null);
                        break;
                    }
                }
            }
        }

        client.disconnect().await;
        pruner.abort();
        println!("{} users online when stopped", live.online_users().len());
        Ok(())
    }

    async fn admin(&self, cmd: AdminCommand) -> anyhow::Result<()> {
        let admin = AdminService::new(self.api.clone()).with_cache(self.cache.clone());
        match cmd {
            AdminCommand::Reports { status } => {
                let status = status.as_deref().map(parse_report_status).transpose()?;
                for r in admin.reports(status).await? {
                    let by = r.reported_by.username().unwrap_or_else(|| r.reported_by.id());
                    println!("[{}] {} {} by {}: {} ({})", r.id, r.content_type, r.content_id, by, r.reason, r.status.as_str());
                }
            }
            AdminCommand::Users { page } => {
                let users = admin.users(page, DEFAULT_PAGE_SIZE).await?;
                for u in &users.users {
                    println!("[{}] {} <{}>{}", u.id, u.username, u.email, if u.is_active { "" } else { " (inactive)" });
                }
                println!("Page {} of {}", page, feed::page_count(users.total_pages));
            }
            AdminCommand::Stats => {
                let stats = admin.dashboard_stats().await?;
                println!("Users: {} ({} active, {} admins)", stats.total_users, stats.active_users, stats.admins);
                println!("Posts: {}", stats.total_posts);
                println!(
                    "Reports: {} pending, {} solved, {} rejected",
                    stats.pending_reports, stats.solved_reports, stats.rejected_reports
                );
                println!("Unread notifications: {}", stats.unread_notifications);
            }
            AdminCommand::Resolve { report_id, note } => {
                let report = admin.resolve_report(&report_id, note).await?;
                println!("Report {} is {}", report.id, report.status.as_str());
            }
            AdminCommand::Reject { report_id, note } => {
                let report = admin.reject_report(&report_id, note).await?;
                println!("Report {} is {}", report.id, report.status.as_str());
            }
            AdminCommand::Broadcast { message } => {
                admin.broadcast(&message.join(" ")).await?;
                println!("Notification sent");
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    EmpathyLogger::init(&default_level);

    let app = match App::new(&cli) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Startup failed: {:#}", e);
            std::process::exit(2);
        }
    };

    if let Err(e) = app.run(cli.command).await {
        match e.downcast_ref::<ApiError>() {
            Some(api_err) => {
                app.errors.capture(ErrorKind::Api, api_err.to_string(), serde_json::json!({ "status": api_err.status() }));
                eprintln!("{}", api_err.user_message());
            }
            None => eprintln!("{}", e),
        }
        std::process::exit(1);
    }
}
