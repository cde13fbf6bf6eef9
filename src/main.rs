use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{info, warn};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use ridekit::api::HttpApi;
use ridekit::client::{RideController, Services};
use ridekit::console::{self, DriverFeed};
use ridekit::core::action::Action;
use ridekit::core::auth::{RegisterRequest, UserRole};
use ridekit::core::config::{self, ResolvedConfig};
use ridekit::core::geo::{Coordinates, Location};
use ridekit::core::state::Store;
use ridekit::core::storage::{FileStorage, MemoryStorage, SecureStorage};
use ridekit::realtime::watcher::FinishCallback;
use ridekit::realtime::{LogFeedback, ReconnectPolicy, SseChannel, StatusWatcher, WatchOutcome};

const DEFAULT_CANCEL_REASON: &str = "Cancelled by rider";

#[derive(Parser)]
#[command(name = "ridekit", about = "Ride-sharing client")]
struct Args {
    /// Backend base URL (overrides config and RIDEKIT_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        email: String,
        /// Read from stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and store the session
    Register {
        name: String,
        email: String,
        phone: String,
        #[arg(long)]
        password: Option<String>,
        /// Register as a driver
        #[arg(long)]
        driver: bool,
    },
    /// Forget the stored session
    Logout,
    /// List ride options
    Options,
    /// Price a trip, e.g. `estimate 40.7128,-74.006 40.7589,-73.9851 --option lux`
    Estimate {
        pickup: Coordinates,
        dropoff: Coordinates,
        #[arg(long = "option", required = true)]
        options: Vec<String>,
    },
    /// Book a ride
    Book {
        pickup: Coordinates,
        dropoff: Coordinates,
        #[arg(long = "option")]
        option: String,
        #[arg(long)]
        notes: Option<String>,
        /// Follow the ride until it ends
        #[arg(long)]
        watch: bool,
    },
    /// Cancel the current ride
    Cancel {
        ride_id: String,
        #[arg(long, default_value = DEFAULT_CANCEL_REASON)]
        reason: String,
    },
    /// Show past rides
    History,
    /// Follow a ride's status until it ends
    Watch { ride_id: String },
    /// Open the driver console
    Driver,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Initialize file logger - writes to ridekit.log in current directory
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();
    if let Ok(log_file) = File::create("ridekit.log") {
        let _ = WriteLogger::init(LevelFilter::Debug, log_config, log_file);
    }

    let file_config = config::load_config().unwrap_or_else(|e| {
        eprintln!("Warning: {e}. Using defaults.");
        Default::default()
    });
    let config = config::resolve(&file_config, args.api_url.as_deref());
    info!("RideKit starting up against {}", config.api_base_url);

    let storage: Arc<dyn SecureStorage> = match &config.credentials_file {
        Some(path) => Arc::new(FileStorage::new(path.clone())),
        None => {
            warn!("No home directory; credentials will not persist");
            Arc::new(MemoryStorage::default())
        }
    };
    let api = Arc::new(HttpApi::new(&config.api_base_url, config.timeout)?);
    let services = Services::new(api, storage);
    let mut controller = RideController::new(Store::from_config(&config), services.clone());

    let command = match args.command {
        Command::Login { email, password } => {
            let password = password_or_prompt(password)?;
            controller.login(&email, &password).await?;
            println!("{}", controller.store.status_message);
            return Ok(());
        }
        Command::Register {
            name,
            email,
            phone,
            password,
            driver,
        } => {
            let password = password_or_prompt(password)?;
            let role = if driver { UserRole::Driver } else { UserRole::Rider };
            controller
                .register(RegisterRequest {
                    name,
                    email,
                    phone,
                    password,
                    role,
                })
                .await?;
            println!("{}", controller.store.status_message);
            return Ok(());
        }
        command => command,
    };

    if !controller.restore_session().await {
        info!("No stored session");
    }

    match command {
        Command::Login { .. } | Command::Register { .. } => {}
        Command::Logout => {
            controller.logout().await;
            println!("Signed out");
        }
        Command::Options => {
            controller.fetch_ride_options().await?;
            for option in &controller.store.ride.ride_options {
                println!(
                    "{:<10} {:<16} base {:.2} + {:.2}/km + {:.2}/min  ({} seats)",
                    option.id,
                    option.name,
                    option.base_price,
                    option.per_km_price,
                    option.per_minute_price,
                    option.capacity
                );
            }
        }
        Command::Estimate {
            pickup,
            dropoff,
            options,
        } => {
            // Catalog lets missing quotes be filled locally.
            if let Err(e) = controller.fetch_ride_options().await {
                warn!("Ride options unavailable: {}", e);
            }
            controller
                .get_ride_estimate(pickup.into(), dropoff.into(), options)
                .await?;
            if let Some(estimate) = &controller.store.ride.current_estimate {
                println!(
                    "{:.1} km, {:.0} min, surge x{:.2}",
                    estimate.distance_km, estimate.duration_min, estimate.surge_multiplier
                );
                for quote in &estimate.quotes {
                    println!("  {:<10} {}", quote.option_id, quote.fare.display_total());
                }
            }
        }
        Command::Book {
            pickup,
            dropoff,
            option,
            notes,
            watch,
        } => {
            if let Err(e) = controller.fetch_ride_options().await {
                warn!("Ride options unavailable: {}", e);
            }
            if let Err(e) = controller.fetch_payment_methods().await {
                warn!("Payment methods unavailable: {}", e);
            }
            let receipt = controller
                .book_ride(
                    Location::from(pickup),
                    Location::from(dropoff),
                    &option,
                    None,
                    notes,
                )
                .await?;
            println!("Ride {} requested", receipt.ride_id);
            if watch {
                watch_ride(&mut controller, &config, &receipt.ride_id).await;
            }
        }
        Command::Cancel { ride_id, reason } => {
            controller
                .apply_watch_action(Action::CancelRide {
                    ride_id: ride_id.clone(),
                    reason,
                })
                .await?;
            println!("Ride {} cancelled", ride_id);
        }
        Command::History => {
            controller.fetch_ride_history().await?;
            if controller.store.ride.ride_history.is_empty() {
                println!("No rides yet");
            }
            for record in &controller.store.ride.ride_history {
                println!(
                    "{}  {:<10} {:>8.2} {}  {} -> {}",
                    record.date.format("%Y-%m-%d %H:%M"),
                    record.status.label(),
                    record.total_fare,
                    record.currency,
                    record.pickup_address,
                    record.dropoff_address
                );
            }
        }
        Command::Watch { ride_id } => {
            watch_ride(&mut controller, &config, &ride_id).await;
        }
        Command::Driver => {
            let Some(driver_id) = controller.store.user_id().map(str::to_string) else {
                return Err("Sign in as a driver first (ridekit login <email>)".into());
            };
            let channel = Arc::new(SseChannel::new(&config.stream_url));
            channel.set_token(controller.store.auth.token.clone());
            let feed = DriverFeed {
                channel,
                driver_id,
                policy: ReconnectPolicy::from_config(&config),
            };
            console::run(controller.store, services, Some(feed))?;
        }
    }
    Ok(())
}

fn password_or_prompt(password: Option<String>) -> io::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

fn build_watcher(controller: &RideController, config: &ResolvedConfig) -> StatusWatcher {
    let channel = SseChannel::new(&config.stream_url);
    channel.set_token(controller.store.auth.token.clone());
    StatusWatcher::new(
        Arc::new(channel),
        Arc::new(LogFeedback),
        ReconnectPolicy::from_config(config),
        config.pending_action_ttl,
    )
}

fn print_action(action: &Action) {
    match action {
        Action::RideStatusChanged { ride_id, status } => {
            println!("{ride_id}: {}", status.label());
        }
        Action::DriverLocationUpdated {
            location, eta_min, ..
        } => match eta_min {
            Some(eta) => println!("  driver at {location}, {eta} min away"),
            None => println!("  driver at {location}"),
        },
        _ => {}
    }
}

/// What a line typed during `watch` asks for.
#[derive(Debug, PartialEq)]
enum WatchInput {
    Cancel(String),
    Refresh,
    Quit,
}

fn parse_watch_input(line: &str) -> Option<WatchInput> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    match word {
        "c" | "cancel" => {
            let reason = rest.trim();
            let reason = if reason.is_empty() { DEFAULT_CANCEL_REASON } else { reason };
            Some(WatchInput::Cancel(reason.to_string()))
        }
        "r" | "refresh" => Some(WatchInput::Refresh),
        "q" | "quit" => Some(WatchInput::Quit),
        _ => None,
    }
}

/// Follows `ride_id` until it ends, the stream gives up, or Ctrl+C.
///
/// Lines on stdin: `c [reason]` cancels, `r` refreshes, `q` stops. Commands
/// issued while the stream is down are queued and replayed on reconnect.
async fn watch_ride(controller: &mut RideController, config: &ResolvedConfig, ride_id: &str) {
    let (tx, mut rx) = mpsc::channel(64);
    let on_finished: FinishCallback = Box::new(|status| println!("Ride ended: {}", status.label()));
    let handle = build_watcher(controller, config).spawn(ride_id, tx, Some(on_finished));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    println!("[c <reason>] cancel  [r] refresh  [q] quit");

    loop {
        tokio::select! {
            action = rx.recv() => match action {
                Some(action) => {
                    print_action(&action);
                    match controller.apply_watch_action(action).await {
                        Ok(()) if !controller.store.status_message.is_empty() => {
                            println!("{}", controller.store.status_message);
                            controller.store.status_message.clear();
                        }
                        Ok(()) => {}
                        Err(e) => eprintln!("{e}"),
                    }
                }
                None => break,
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_watch_input(&line) {
                    Some(WatchInput::Cancel(reason)) => handle.cancel(&reason).await,
                    Some(WatchInput::Refresh) => handle.refresh().await,
                    Some(WatchInput::Quit) => {
                        handle.stop().await;
                        break;
                    }
                    None => eprintln!("Unknown command: {}", line.trim()),
                },
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.stop().await;
                break;
            }
        }
    }

    match handle.join().await {
        WatchOutcome::GaveUp => eprintln!("Lost connection to the ride stream"),
        outcome => info!("Watch ended: {:?}", outcome),
    }
}
