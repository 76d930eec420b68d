use clap::{Parser, Subcommand};
use image_stack::config;
use image_stack::factory::StackFactory;
use image_stack::output::{self, Inventory};
use image_stack::types::ImagePath;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "image-stack")]
#[command(about = "Fetch, transform and store images through configured stacks")]
#[command(long_about = "\
Fetch, transform and store images through configured stacks

A stack is a backend (where originals come from), an ordered list of
manipulators (thumbnail, convert, watermark, optimize) and an optional
storage that keeps the result. Everything is declared by name in a TOML file:

  [stacks.thumbs]
  backend = \"originals\"
  manipulators = [\"thumbnail\"]
  storage = \"public\"

  [backends.originals]
  driver = \"file\"
  root = \"/srv/images\"

  [manipulators.thumbnail]
  driver = \"thumbnailer\"
  rules = [['^t_(\\d+)x(\\d+)/', '{1}x{2}']]

Requesting thumbs t_100x100/cat.jpg reads /srv/images/t_100x100/cat.jpg
(add a path_rule backend to strip the prefix), crops it to 100x100 and
writes it under the storage root.

Run 'image-stack gen-config' to generate a documented configuration.")]
#[command(version)]
struct Cli {
    /// Stack configuration file
    #[arg(long, short, default_value = "image-stack.toml", global = true)]
    config: PathBuf,

    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one image through a stack
    Stack {
        /// Stack name
        stack: String,
        /// Image path as requested from the stack
        path: String,
        /// Write the image here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Validate the configuration and construct every entry
    Check {
        /// Print the inventory as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a stock configuration with all options documented
    GenConfig,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Stack {
            stack,
            path,
            output: out_file,
        } => {
            let factory = StackFactory::new(config::load_config(&cli.config)?)?;
            let image_path = ImagePath::new(stack.as_str(), path);
            let result = factory.stack(&stack)?.stack_image(&image_path)?;

            match out_file {
                Some(file) => std::fs::write(&file, result.image.bytes())?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(result.image.bytes())?;
                    stdout.flush()?;
                }
            }
            output::print_stack_output(&image_path, &result);
        }
        Command::Check { json } => {
            let config = config::load_config(&cli.config)?;
            let inventory = Inventory::from_config(&config);
            StackFactory::new(config)?.warm_up()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&inventory)?);
            } else {
                println!("==> Checking {}", cli.config.display());
                output::print_check_output(&inventory);
                println!("==> Configuration is valid");
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}
