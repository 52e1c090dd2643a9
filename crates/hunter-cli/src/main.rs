use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hunter_core::{EncoderOptions, FaceEncoder, DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[zbus::proxy(
    interface = "org.hunter.Hunter1",
    default_service = "org.hunter.Hunter1",
    default_path = "/org/hunter/Hunter1"
)]
trait Hunter {
    fn enroll(&self, metadata_json: &str, image_path: &str) -> zbus::Result<String>;
    fn search(&self, image_path: &str, longitude: &str, latitude: &str) -> zbus::Result<String>;
    fn list_persons(&self, category: &str) -> zbus::Result<String>;
    fn list_matches(&self) -> zbus::Result<String>;
    fn get_person(&self, id: &str) -> zbus::Result<String>;
    fn delete(&self, id: &str) -> zbus::Result<()>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "hunter", about = "Hunter face matching CLI")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a person from a photograph
    Enroll {
        image: PathBuf,
        #[arg(long)]
        name: String,
        /// Category tag (e.g. "wanted", "criminal", "missing")
        #[arg(long)]
        category: String,
        #[arg(long)]
        age: Option<u32>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        ethnicity: Option<String>,
    },
    /// Match a photograph against enrolled persons
    Search {
        image: PathBuf,
        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<f64>,
        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<f64>,
    },
    /// List enrolled persons in a category
    List {
        #[arg(short, long)]
        category: String,
    },
    /// Show the match history
    Matches,
    /// Show one enrolled person
    Show { id: String },
    /// Delete an enrolled person
    Delete { id: String },
    /// Show daemon status
    Status,
    /// Run the face encoder locally on an image (bypasses the daemon)
    Test {
        image: PathBuf,
        #[arg(long, default_value_os_t = hunter_core::default_model_dir())]
        model_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Test { image, model_dir } => run_encoder_test(&image, &model_dir),
        command => run_daemon_command(cli.session, command).await,
    }
}

async fn run_daemon_command(session: bool, command: Commands) -> Result<()> {
    let conn = if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("connecting to D-Bus")?;
    let proxy = HunterProxy::new(&conn)
        .await
        .context("hunterd is not reachable")?;

    match command {
        Commands::Enroll {
            image,
            name,
            category,
            age,
            description,
            gender,
            ethnicity,
        } => {
            let metadata = serde_json::json!({
                "name": name,
                "age": age,
                "description": description,
                "category": category,
                "gender": gender,
                "ethnicity": ethnicity,
            });
            let reply = proxy
                .enroll(&metadata.to_string(), &absolute(&image)?)
                .await?;
            print_json(&reply)?;
        }
        Commands::Search {
            image,
            longitude,
            latitude,
        } => {
            let reply = proxy
                .search(
                    &absolute(&image)?,
                    &coordinate(longitude),
                    &coordinate(latitude),
                )
                .await?;
            print_json(&reply)?;
        }
        Commands::List { category } => print_json(&proxy.list_persons(&category).await?)?,
        Commands::Matches => print_json(&proxy.list_matches().await?)?,
        Commands::Show { id } => print_json(&proxy.get_person(&id).await?)?,
        Commands::Delete { id } => {
            proxy.delete(&id).await?;
            println!("Deleted {id}");
        }
        Commands::Status => print_json(&proxy.status().await?)?,
        Commands::Test { image, model_dir } => run_encoder_test(&image, &model_dir)?,
    }

    Ok(())
}

/// The daemon resolves paths in its own working directory.
fn absolute(path: &Path) -> Result<String> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("cannot access {}", path.display()))?;
    Ok(canonical.to_string_lossy().into_owned())
}

fn coordinate(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn print_json(raw: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(raw).context("daemon returned invalid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn run_encoder_test(image: &Path, model_dir: &Path) -> Result<()> {
    println!("Loading models from {}...", model_dir.display());
    let detector = model_dir.join(DETECTOR_MODEL_FILE);
    let recognizer = model_dir.join(RECOGNIZER_MODEL_FILE);
    tracing::debug!(
        detector = %detector.display(),
        recognizer = %recognizer.display(),
        "loading face encoder"
    );
    let mut encoder = FaceEncoder::load(&detector, &recognizer, EncoderOptions::default())?;

    let decoded = image::open(image).with_context(|| format!("opening {}", image.display()))?;
    println!(
        "Image: {}x{} ({})",
        decoded.width(),
        decoded.height(),
        image.display()
    );

    let start = Instant::now();
    let signature = encoder.encode(&decoded)?;
    let elapsed = start.elapsed();
    tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "encode finished");

    match signature {
        Some(sig) => {
            let norm: f32 = sig.values.iter().map(|v| v * v).sum::<f32>().sqrt();
            println!(
                "Face found: {}-d signature ({}), norm {norm:.4}, {:.1}ms",
                sig.dim(),
                sig.version,
                elapsed.as_secs_f64() * 1000.0
            );
        }
        None => println!(
            "No face detected ({:.1}ms)",
            elapsed.as_secs_f64() * 1000.0
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_search_with_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "hunter",
            "search",
            "photo.jpg",
            "--longitude",
            "-0.12",
            "--latitude",
            "51.5",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                longitude,
                latitude,
                ..
            } => {
                assert_eq!(longitude, Some(-0.12));
                assert_eq!(latitude, Some(51.5));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_encoder_test_reports_missing_models() {
        let empty_dir = std::env::temp_dir().join("hunter-cli-no-models");
        let err = run_encoder_test(Path::new("face.jpg"), &empty_dir).unwrap_err();
        let core = err.downcast_ref::<hunter_core::Error>().unwrap();
        assert!(matches!(core, hunter_core::Error::ExtractorUnavailable(m) if m.contains(DETECTOR_MODEL_FILE)));
    }

    #[test]
    fn test_coordinate_rendering() {
        assert_eq!(coordinate(None), "");
        assert_eq!(coordinate(Some(12.5)), "12.5");
    }

    #[test]
    fn test_global_session_flag() {
        let cli = Cli::try_parse_from(["hunter", "status", "--session"]).unwrap();
        assert!(cli.session);
        assert!(matches!(cli.command, Commands::Status));
    }
}
