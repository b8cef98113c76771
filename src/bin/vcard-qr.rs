//! vcard-qr: command-line front end for generating contact QR codes.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use vcard_qr::{download_filename, vcard, Config, ContactRecord, ModuleRenderer, Session, Tier};

#[derive(Parser)]
#[command(name = "vcard-qr")]
#[command(author, version, about = "Generate vCard QR codes")]
#[command(propagate_version = true)]
struct Cli {
    /// JSON config file (defaults plus VCARD_QR_* variables when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a QR code PNG for a contact
    Generate {
        #[command(flatten)]
        contact: ContactArgs,

        /// Photo to embed and draw as the centre logo
        #[arg(long)]
        photo: Option<PathBuf>,

        /// Output PNG (default: <name>-qr-code.png)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the vCard text that was encoded
        #[arg(long)]
        vcard_out: Option<PathBuf>,

        /// Also write an SVG of the same payload (no logo)
        #[arg(long)]
        svg: Option<PathBuf>,

        /// Print the result as JSON instead of a summary line
        #[arg(long)]
        json: bool,
    },

    /// Print the vCard text for a contact without rendering
    Vcard {
        #[command(flatten)]
        contact: ContactArgs,

        /// Tier to encode (full needs --photo)
        #[arg(short, long, default_value = "no-photo")]
        tier: TierArg,

        #[arg(long)]
        photo: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ContactArgs {
    /// Full name
    #[arg(short, long)]
    name: String,

    /// Phone number
    #[arg(short, long)]
    phone: String,

    /// Email address
    #[arg(short, long)]
    email: String,

    #[arg(long)]
    company: Option<String>,

    #[arg(long)]
    job_title: Option<String>,

    #[arg(long)]
    website: Option<String>,

    #[arg(long)]
    address: Option<String>,

    #[arg(long)]
    notes: Option<String>,
}

impl ContactArgs {
    fn to_record(&self) -> ContactRecord {
        let mut record = ContactRecord::new(&self.name, &self.phone, &self.email);
        if let Some(v) = &self.company {
            record = record.with_company(v);
        }
        if let Some(v) = &self.job_title {
            record = record.with_job_title(v);
        }
        if let Some(v) = &self.website {
            record = record.with_website(v);
        }
        if let Some(v) = &self.address {
            record = record.with_address(v);
        }
        if let Some(v) = &self.notes {
            record = record.with_notes(v);
        }
        record
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum TierArg {
    Full,
    NoPhoto,
    Minimal,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Full => Tier::Full,
            TierArg::NoPhoto => Tier::NoPhoto,
            TierArg::Minimal => Tier::Minimal,
        }
    }
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vcard_qr=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Config::from_env().context("reading VCARD_QR_* environment"),
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Generate {
            contact,
            photo,
            output,
            vcard_out,
            svg,
            json,
        } => {
            let record = contact.to_record();
            let mut session = Session::new(config)?;
            if let Some(path) = &photo {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading photo {}", path.display()))?;
                session.attach_photo(&bytes)?;
            }

            let renderer = ModuleRenderer::default();
            let generated = session.generate(&record, &renderer)?;

            let output = output.unwrap_or_else(|| PathBuf::from(download_filename(&record.full_name)));
            std::fs::write(&output, generated.image.png_bytes())
                .with_context(|| format!("writing {}", output.display()))?;

            if let Some(card) = session.last_vcard() {
                if let Some(path) = &vcard_out {
                    std::fs::write(path, card.as_str())
                        .with_context(|| format!("writing {}", path.display()))?;
                }
                if let Some(path) = &svg {
                    let text = renderer.render_svg(card.as_str(), &generated.spec)?;
                    std::fs::write(path, text)
                        .with_context(|| format!("writing {}", path.display()))?;
                }
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&generated)?);
            } else {
                println!(
                    "{} ({} tier, {} bytes, {}px, level {}) -> {}",
                    generated.message,
                    generated.tier_used,
                    generated.data_len,
                    generated.image.width(),
                    generated.spec.ec_level,
                    output.display()
                );
            }
        }
        Commands::Vcard { contact, tier, photo } => {
            let record = contact.to_record().normalized();
            record.validate()?;
            let mut session = Session::new(config)?;
            if let Some(path) = &photo {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading photo {}", path.display()))?;
                session.attach_photo(&bytes)?;
            }
            let encoder = vcard::VCardEncoder::new(session.config().photo_embed_limit);
            let card = encoder.encode(&record, tier.into(), session.photo())?;
            println!("{}", card);
        }
    }
    Ok(())
}
