use crate::bookings::BookingStore;
use crate::config::Config;
use crate::dorms::DormCatalog;
use crate::http::{SecureClient, Transport};
use crate::journal::Journal;
use crate::error::ApiError;
use crate::models::{parse_instant, Credentials, DateRange, DormFilters, Registration};
use crate::session::{SessionCell, SessionStore};
use crate::views;
use anyhow::{anyhow, bail, Context as _, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub struct Context {
    pub config: Config,
    pub session_id: String,
    pub session: SessionStore,
    pub bookings: BookingStore,
    pub dorms: DormCatalog,
    pub journal: RefCell<Option<Journal>>,
}

impl Context {
    /// Wire the stores to one shared client over `transport`
    pub fn new(
        config: Config,
        transport: Box<dyn Transport>,
        session_id: String,
        journal: Option<Journal>,
    ) -> Self {
        let client = Arc::new(SecureClient::new(transport, &config.api, SessionCell::new()));
        Self {
            session: SessionStore::new(client.clone()),
            bookings: BookingStore::new(client.clone(), &config.bookings),
            dorms: DormCatalog::new(client),
            config,
            session_id,
            journal: RefCell::new(journal),
        }
    }

    fn record<F>(&self, f: F)
    where
        F: FnOnce(&mut Journal) -> Result<()>,
    {
        if let Some(journal) = self.journal.borrow_mut().as_mut() {
            if let Err(e) = f(journal) {
                warn!(error = %e, "failed to write journal");
            }
        }
    }
}

/// A parsed REPL line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Exit,
    Session,
    WhoAmI,
    Login {
        username: String,
        password: Option<String>,
    },
    Logout,
    Register {
        username: String,
        password: String,
        phone: String,
        school_id: Option<String>,
    },
    Dorms(DormFilters),
    Dorm(String),
    Bookings {
        page: Option<u32>,
        limit: Option<u32>,
    },
    Book {
        dorm: String,
        range: DateRange,
    },
    Cancel(String),
    Clear,
}

const HELP: &str = "Commands:
  /exit                                   - quit
  /help                                   - show commands
  /session                                - show session info
  /whoami                                 - re-check the login session
  /login <username> [password]            - log in (password from DORMBOOK_PASSWORD or prompt)
  /logout                                 - log out
  /register <user> <password> <phone> [school_id]
Dorms:
  /dorms [max_price=N] [max_minutes=N] [amenity...]
  /dorm <id>                              - show one dorm
Bookings:
  /bookings [page] [limit]                - fetch a page and append it
  /book <dorm_id> <start> <end>           - dates as YYYY-MM-DD or RFC 3339
  /cancel <booking_id>
  /clear                                  - forget loaded bookings";

fn parse_number<T: std::str::FromStr>(value: &str, what: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {}: '{}'", what, value))
}

fn parse_date(value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    parse_instant(value).ok_or_else(|| {
        anyhow!(
            "Invalid date '{}': use YYYY-MM-DD or an RFC 3339 timestamp",
            value
        )
    })
}

pub fn parse_command(line: &str) -> Result<Command> {
    let words = shell_words::split(line).context("Could not parse command line")?;
    let (name, args) = match words.split_first() {
        Some((name, args)) => (name.as_str(), args),
        None => bail!("Empty command"),
    };

    let arity = |min: usize, max: usize, usage: &str| -> Result<()> {
        if args.len() < min || args.len() > max {
            bail!("Usage: {}", usage);
        }
        Ok(())
    };

    let command = match name {
        "/exit" | "/quit" => Command::Exit,
        "/help" => Command::Help,
        "/session" => Command::Session,
        "/whoami" => Command::WhoAmI,
        "/login" => {
            arity(1, 2, "/login <username> [password]")?;
            Command::Login {
                username: args[0].clone(),
                password: args.get(1).cloned(),
            }
        }
        "/logout" => Command::Logout,
        "/register" => {
            arity(3, 4, "/register <user> <password> <phone> [school_id]")?;
            Command::Register {
                username: args[0].clone(),
                password: args[1].clone(),
                phone: args[2].clone(),
                school_id: args.get(3).cloned(),
            }
        }
        "/dorms" => {
            let mut filters = DormFilters::default();
            for arg in args {
                if let Some(v) = arg.strip_prefix("max_price=") {
                    filters.max_price = Some(parse_number(v, "max_price")?);
                } else if let Some(v) = arg.strip_prefix("max_minutes=") {
                    filters.max_distance = Some(parse_number(v, "max_minutes")?);
                } else {
                    filters.amenities.push(arg.clone());
                }
            }
            Command::Dorms(filters)
        }
        "/dorm" => {
            arity(1, 1, "/dorm <id>")?;
            Command::Dorm(args[0].clone())
        }
        "/bookings" => {
            arity(0, 2, "/bookings [page] [limit]")?;
            Command::Bookings {
                page: args.first().map(|v| parse_number(v, "page")).transpose()?,
                limit: args.get(1).map(|v| parse_number(v, "limit")).transpose()?,
            }
        }
        "/book" => {
            arity(3, 3, "/book <dorm_id> <start> <end>")?;
            Command::Book {
                dorm: args[0].clone(),
                range: DateRange::new(parse_date(&args[1])?, parse_date(&args[2])?),
            }
        }
        "/cancel" => {
            arity(1, 1, "/cancel <booking_id>")?;
            Command::Cancel(args[0].clone())
        }
        "/clear" => Command::Clear,
        other => bail!("Unknown command: {}. Type /help for commands", other),
    };
    Ok(command)
}

fn resolve_password(given: Option<String>) -> Result<String> {
    if let Some(password) = given {
        return Ok(password);
    }
    if let Ok(password) = std::env::var("DORMBOOK_PASSWORD") {
        return Ok(password);
    }
    let mut rl = DefaultEditor::new()?;
    Ok(rl.readline("Password: ")?)
}

fn access_denied(err: &ApiError) -> String {
    match err {
        ApiError::NotVerified => {
            "Your account is not verified yet. Booking opens once the school verifies it".to_string()
        }
        _ => "Not logged in. Use /login <username>".to_string(),
    }
}

/// Run one command. Returns the text to show, or `None` to exit.
pub fn dispatch(ctx: &Context, command: Command) -> Result<Option<String>> {
    let phase = ctx.session.phase();
    let ready = ctx.session.is_ready();
    let output = match command {
        Command::Exit => return Ok(None),
        Command::Help => HELP.to_string(),
        Command::Session => {
            let mut out = format!(
                "Session: {} ({})\nAPI: {}\n",
                ctx.session_id,
                phase.as_str(),
                ctx.config.api.base_url
            );
            if let Some(journal) = ctx.journal.borrow().as_ref() {
                out.push_str(&format!("Journal: {}\n", journal.path.display()));
            }
            out.push_str(&views::session_line(phase, ctx.session.user().as_ref()));
            out
        }
        Command::WhoAmI => {
            let user = ctx.session.verify();
            views::session_line(ctx.session.phase(), user.as_ref())
        }
        Command::Login { username, password } => {
            let password = resolve_password(password)?;
            let result = ctx.session.login(&Credentials::new(&username, &password));
            let error = result.as_ref().err().map(|e| e.user_message());
            ctx.record(|j| j.login(&username, result.is_ok(), error.as_deref()));
            let user = result.map_err(|e| anyhow!(e.user_message()))?;
            views::session_line(ctx.session.phase(), Some(&user))
        }
        Command::Logout => {
            ctx.session.logout();
            ctx.bookings.clear();
            ctx.record(|j| j.logout());
            views::session_line(ctx.session.phase(), None)
        }
        Command::Register {
            username,
            password,
            phone,
            school_id,
        } => {
            let registration =
                Registration::student(&username, &password, &phone, school_id.as_deref());
            let user = ctx
                .session
                .register(&registration)
                .map_err(|e| anyhow!(e.user_message()))?;
            format!("Registered {}. Use /login {} to sign in", user.username, user.username)
        }
        Command::Dorms(filters) => views::gated(ready, || match ctx.dorms.list(&filters) {
            Ok(dorms) => views::dorm_list(&dorms),
            Err(e) => format!("Error: {}", e.user_message()),
        }),
        Command::Dorm(id) => views::gated(ready, || match ctx.dorms.get(&id) {
            Ok(dorm) => views::dorm_card(&dorm),
            Err(e) => format!("Error: {}", e.user_message()),
        }),
        Command::Bookings { page, limit } => views::gated(ready, || {
            if let Err(e) = ctx.session.require_user() {
                return access_denied(&e);
            }
            if let Ok(count) = ctx.bookings.fetch_bookings(page, limit) {
                ctx.record(|j| j.bookings_fetched(page.unwrap_or(1), count));
            }
            views::booking_table(&ctx.bookings.snapshot())
        }),
        Command::Book { dorm, range } => views::gated(ready, || {
            if let Err(e) = ctx.session.require_verified() {
                return access_denied(&e);
            }
            match ctx.bookings.create_booking(&dorm, range) {
                Ok(booking) => ctx.record(|j| j.booking_created(&booking.id, &booking.dorm)),
                Err(e) => ctx.record(|j| j.booking_failed(&dorm, &e.user_message())),
            }
            views::booking_table(&ctx.bookings.snapshot())
        }),
        Command::Cancel(id) => views::gated(ready, || {
            if let Err(e) = ctx.session.require_user() {
                return access_denied(&e);
            }
            let ok = ctx.bookings.cancel_booking(&id).is_ok();
            ctx.record(|j| j.booking_cancelled(&id, ok));
            views::booking_table(&ctx.bookings.snapshot())
        }),
        Command::Clear => {
            ctx.bookings.clear();
            "Bookings cleared".to_string()
        }
    };
    Ok(Some(output))
}

pub fn run_once(ctx: &Context, line: &str) -> Result<()> {
    let command = parse_command(line)?;
    if let Some(output) = dispatch(ctx, command)? {
        println!("{}", output);
    }
    Ok(())
}

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".dormbook").join("history"))
}

pub fn run_repl(ctx: Context) -> Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    println!("dormbook - type /help for commands, /exit to quit");
    println!(
        "{}",
        views::session_line(ctx.session.phase(), ctx.session.user().as_ref())
    );

    loop {
        match rl.readline("dorm> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                // Keep passwords out of the history file
                if !line.starts_with("/login") && !line.starts_with("/register") {
                    rl.add_history_entry(line)?;
                }

                match parse_command(line).and_then(|command| dispatch(&ctx, command)) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => break,
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {}", e);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let _ = rl.save_history(path);
    }
    Ok(())
}
