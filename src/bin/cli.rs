//! PlateDB CLI
//!
//! Command-line access to a store on disk.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use platedb::{Column, Config, Context, Engine, Record, RECORD_SIZE};
use tracing_subscriber::{fmt, EnvFilter};

/// PlateDB CLI
#[derive(Parser, Debug)]
#[command(name = "platedb-cli")]
#[command(about = "CLI for the PlateDB storage engine")]
#[command(version)]
struct Args {
    /// Fast tier directory (log buffers)
    #[arg(long, default_value = "./platedb_data/buffer")]
    buffer_dir: PathBuf,

    /// Slow tier directory (durable log)
    #[arg(long, default_value = "./platedb_data/durable")]
    durable_dir: PathBuf,

    /// Writer shards; must match the store
    #[arg(long, default_value = "8")]
    shards: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append a record
    Insert {
        id: i64,
        user_id: String,
        name: String,
        salary: i64,
    },

    /// Print the `select` column of records matching `where = key`
    Select {
        #[arg(value_enum)]
        select: ColumnArg,

        #[arg(value_enum, long = "where")]
        where_column: ColumnArg,

        /// Integer for id/salary, text for userid/name
        key: String,
    },

    /// Print engine statistics
    Stats,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ColumnArg {
    Id,
    Userid,
    Name,
    Salary,
}

impl From<ColumnArg> for Column {
    fn from(arg: ColumnArg) -> Self {
        match arg {
            ColumnArg::Id => Column::Id,
            ColumnArg::Userid => Column::Userid,
            ColumnArg::Name => Column::Name,
            ColumnArg::Salary => Column::Salary,
        }
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,platedb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .buffer_dir(&args.buffer_dir)
        .durable_dir(&args.durable_dir)
        .shards(args.shards)
        .fence_interval_ms(0)
        .build();

    let engine = match Engine::open(config) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            process::exit(1);
        }
    };

    let result = run(&engine, args.command);
    let closed = engine.close();
    if let Err(e) = result.and(closed) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> platedb::Result<()> {
    match command {
        Commands::Insert {
            id,
            user_id,
            name,
            salary,
        } => {
            let record = Record::new(id, user_id, name, salary);
            engine.append(&Context::new(), &record.encode())?;
            println!("OK");
        }
        Commands::Select {
            select,
            where_column,
            key,
        } => {
            let select = Column::from(select);
            let where_column = Column::from(where_column);
            let key = if where_column.is_integer() {
                let value: i64 = key.parse().map_err(|_| {
                    platedb::PlateError::Config(format!("{:?} key must be an integer", where_column))
                })?;
                value.to_le_bytes().to_vec()
            } else {
                key.into_bytes()
            };

            let mut out = Vec::with_capacity(RECORD_SIZE);
            let count = engine.read(select, where_column, &key, &mut out)?;
            for field in out.chunks(select.width()) {
                if select.is_integer() {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(field);
                    println!("{}", i64::from_le_bytes(raw));
                } else {
                    let end = field.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                    println!("{}", String::from_utf8_lossy(&field[..end]));
                }
            }
            println!("({} rows)", count);
        }
        Commands::Stats => {
            let stats = engine.stats();
            println!("phase:            {}", stats.phase);
            println!("indexed records:  {}", stats.indexed_records);
            println!("cluster index:    {}", stats.cluster_index_active);
            for (shard, flushed) in stats.flushed_per_shard.iter().enumerate() {
                println!("shard {:>3} flushed {}", shard, flushed);
            }
        }
    }
    Ok(())
}
