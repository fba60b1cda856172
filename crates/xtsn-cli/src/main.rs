//! Command-line interface for `xtsn`.

#![forbid(unsafe_code)]

mod keys;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{debug, info};
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use xtsn::backend;
use xtsn::{Backend, Direction, SectorParams, Xtsn, XtsnStream};

use keys::{decode_hex, parse_bis_slot, split_pair, BisKeys, KeyPair};

/// AES-XTSN sector image tool.
#[derive(Parser)]
#[command(
    name = "xtsn",
    version,
    author,
    about = "Encrypt and decrypt Nintendo AES-XTSN sector images"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a whole file.
    Encrypt(CryptArgs),
    /// Decrypt a whole file.
    Decrypt(CryptArgs),
    /// Decrypt an arbitrary byte range of an encrypted image.
    Read(ReadArgs),
    /// Report which AES backend is in use.
    Backend,
    /// Run a local demo: random keys and data, encrypt, decrypt, compare backends.
    Demo {
        /// Optional RNG seed for reproducibility.
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Where the crypt and tweak keys come from.
#[derive(Args)]
struct KeyArgs {
    /// Crypt key followed by tweak key, as 64 hex characters.
    #[arg(long, value_name = "HEX", conflicts_with_all = ["crypt_key", "bis_keys"])]
    key: Option<String>,
    /// Crypt key as 32 hex characters.
    #[arg(long, value_name = "HEX", requires = "tweak_key", conflicts_with = "bis_keys")]
    crypt_key: Option<String>,
    /// Tweak key as 32 hex characters.
    #[arg(long, value_name = "HEX", requires = "crypt_key")]
    tweak_key: Option<String>,
    /// Key dump holding BIS keys.
    #[arg(long, value_name = "FILE", requires = "bis_index")]
    bis_keys: Option<PathBuf>,
    /// BIS key slot: 0-3 or a partition name (prodinfo, safe, system, user).
    #[arg(long, value_name = "SLOT", requires = "bis_keys", value_parser = parse_bis_slot)]
    bis_index: Option<usize>,
}

impl KeyArgs {
    fn load(&self) -> Result<KeyPair> {
        if let Some(key) = &self.key {
            return split_pair(key);
        }
        if let (Some(crypt), Some(tweak)) = (&self.crypt_key, &self.tweak_key) {
            return Ok((decode_hex(crypt, "crypt key")?, decode_hex(tweak, "tweak key")?));
        }
        if let (Some(path), Some(slot)) = (&self.bis_keys, self.bis_index) {
            let text = fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            return BisKeys::parse(&text)?.pair(slot);
        }
        bail!("no keys given; use --key, --crypt-key/--tweak-key or --bis-keys/--bis-index")
    }

    fn session(&self) -> Result<Xtsn> {
        let (crypt, tweak) = self.load()?;
        Ok(Xtsn::from_keys(&crypt, &tweak))
    }
}

/// Sector layout shared by every subcommand that touches an image.
#[derive(Args)]
struct SectorArgs {
    /// Index of the sector the data starts in (decimal or 0x hex, up to 128 bits).
    #[arg(long, value_name = "N", default_value = "0", value_parser = parse_u128)]
    sector_offset: u128,
    /// Bytes per sector (decimal or 0x hex).
    #[arg(long, value_name = "BYTES", default_value = "512", value_parser = parse_u64)]
    sector_size: u64,
}

#[derive(Args)]
struct CryptArgs {
    /// Input file (length must be a multiple of 16 bytes).
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
    /// Output file.
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
    #[command(flatten)]
    keys: KeyArgs,
    #[command(flatten)]
    sectors: SectorArgs,
    /// Bytes of the first sector that precede the input (multiple of 16).
    #[arg(long, value_name = "BYTES", default_value = "0", value_parser = parse_u64)]
    skip_bytes: u64,
    /// Use the built-in AES even if libcrypto is available.
    #[arg(long, default_value_t = false)]
    software: bool,
}

#[derive(Args)]
struct ReadArgs {
    /// Encrypted image.
    #[arg(long, value_name = "FILE")]
    image: PathBuf,
    /// Byte offset of the encrypted region inside the image.
    #[arg(long, value_name = "BYTES", default_value = "0", value_parser = parse_u64)]
    base: u64,
    /// Plaintext offset of the first byte to read, relative to the region.
    #[arg(long, value_name = "BYTES", value_parser = parse_u64)]
    offset: u64,
    /// Number of bytes to read.
    #[arg(long, value_name = "BYTES", value_parser = parse_u64)]
    length: u64,
    /// Write the plaintext here instead of printing hex.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,
    #[command(flatten)]
    keys: KeyArgs,
    #[command(flatten)]
    sectors: SectorArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let result = match cli.command {
        Commands::Encrypt(args) => cmd_crypt(Direction::Encrypt, &args),
        Commands::Decrypt(args) => cmd_crypt(Direction::Decrypt, &args),
        Commands::Read(args) => cmd_read(&args),
        Commands::Backend => cmd_backend(),
        Commands::Demo { seed } => cmd_demo(seed),
    };
    backend::shutdown();
    result
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn cmd_crypt(direction: Direction, args: &CryptArgs) -> Result<()> {
    let xtsn = args.keys.session()?;
    let data = fs::read(&args.input).with_context(|| format!("read {}", args.input.display()))?;
    let params = SectorParams::new(args.sectors.sector_size).with_skip(args.skip_bytes);
    let backend = if args.software {
        Backend::Software
    } else {
        Backend::active()
    };
    info!(
        "{direction:?} {} bytes from sector {:#x} on the {} backend",
        data.len(),
        args.sectors.sector_offset,
        backend.name()
    );

    let out = xtsn
        .crypt(&backend, direction, &data, args.sectors.sector_offset, params)
        .with_context(|| format!("{direction:?} {}", args.input.display()))?;
    write_file(&args.output, &out)
}

fn cmd_read(args: &ReadArgs) -> Result<()> {
    let xtsn = args.keys.session()?;
    let length = usize::try_from(args.length).context("length does not fit in memory")?;
    let file = fs::File::open(&args.image)
        .with_context(|| format!("open {}", args.image.display()))?;
    let mut stream = XtsnStream::new(file, xtsn, args.sectors.sector_size)
        .with_base(args.base)
        .with_first_sector(args.sectors.sector_offset);

    debug!(
        "reading {length:#x} bytes at {:#x} (region base {:#x})",
        args.offset, args.base
    );
    let plain = stream
        .read_at(args.offset, length)
        .with_context(|| format!("read range from {}", args.image.display()))?;
    match &args.output {
        Some(path) => write_file(path, &plain),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", hex::encode(&plain))?;
            Ok(())
        }
    }
}

fn cmd_backend() -> Result<()> {
    match Backend::active() {
        Backend::Accelerated(library) => {
            println!("backend: libcrypto");
            println!("version: {:#010x}", library.version());
            println!("path: {}", library.path().display());
        }
        Backend::Software => println!("backend: software"),
    }
    Ok(())
}

fn cmd_demo(seed: Option<u64>) -> Result<()> {
    let mut rng = seeded_rng(seed);
    let mut crypt = [0u8; 16];
    let mut tweak = [0u8; 16];
    rng.fill_bytes(&mut crypt);
    rng.fill_bytes(&mut tweak);
    let xtsn = Xtsn::from_keys(&crypt, &tweak);

    let mut plain = [0u8; 64];
    rng.fill_bytes(&mut plain);
    let sector_offset = u128::from(rng.next_u64());
    let params = SectorParams::new(0x20).with_skip(0x10);

    let software = Backend::Software;
    let reference = xtsn.crypt(&software, Direction::Encrypt, &plain, sector_offset, params)?;
    let active = Backend::active();
    let sealed = xtsn.crypt(&active, Direction::Encrypt, &plain, sector_offset, params)?;
    let opened = xtsn.crypt(&active, Direction::Decrypt, &sealed, sector_offset, params)?;

    println!("demo crypt key: {}", hex::encode(crypt));
    println!("demo tweak key: {}", hex::encode(tweak));
    println!("sector offset: {sector_offset:#x}");
    println!("backend: {}", active.name());
    println!("plaintext: {}", hex::encode(plain));
    println!("ciphertext: {}", hex::encode(&sealed));
    println!("decrypted: {}", hex::encode(&opened));
    if sealed != reference {
        bail!("{} backend disagrees with software AES", active.name());
    }
    if opened != plain {
        bail!("demo roundtrip failed");
    }
    Ok(())
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    fs::write(path, data).with_context(|| format!("write {}", path.display()))
}

fn parse_u128(text: &str) -> std::result::Result<u128, String> {
    let text = text.trim().replace('_', "");
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => u128::from_str_radix(digits, 16),
        None => text.parse(),
    };
    parsed.map_err(|err| format!("{text:?}: {err}"))
}

fn parse_u64(text: &str) -> std::result::Result<u64, String> {
    let value = parse_u128(text)?;
    u64::try_from(value).map_err(|_| format!("{value:#x} does not fit in 64 bits"))
}

fn seeded_rng(seed: Option<u64>) -> impl RngCore + CryptoRng {
    let mut seed_bytes = [0u8; 32];
    match seed {
        Some(value) => seed_bytes[..8].copy_from_slice(&value.to_le_bytes()),
        None => rand::rngs::OsRng.fill_bytes(&mut seed_bytes),
    }
    ChaCha20Rng::from_seed(seed_bytes)
}
