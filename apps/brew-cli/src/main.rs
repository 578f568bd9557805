use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::fmt::Write as _;
use tracing::info;

use device_registry as devreg;
use devreg::{ConfigStorage, DeviceAction, DeviceForm, DeviceReconciler, DevicesView, Reply};

#[derive(Parser, Debug)]
#[command(
    name = "brew",
    version,
    about = "Brewing device registry CLI",
    disable_help_subcommand = true
)]
struct Cli {
    /// Server configuration file holding device aliases
    #[arg(long, default_value = "config.yaml", global = true)]
    config: String,

    /// Archived brew sessions directory (enables machine stats)
    #[arg(long, global = true)]
    archive_dir: Option<String>,

    /// Print JSON instead of tab separated rows
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    json: bool,

    /// Print Prometheus metrics after the command
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct FormArgs {
    /// Machine type (Zymatic, ZSeries, PicoBrew, PicoBrewC, PicoBrewC_Alt, PicoFerm, iSpindel, Tilt, PicoStill)
    #[arg(long)]
    machine_type: String,
    /// Display alias
    #[arg(long, default_value = "")]
    alias: String,
    /// Network address (PicoStill)
    #[arg(long)]
    ip_addr: Option<String>,
    /// Device runs the alternate PicoBrew C firmware
    #[arg(long, action = ArgAction::SetTrue)]
    alt_firmware: bool,
}

impl FormArgs {
    fn into_form(self, uid: &str) -> DeviceForm {
        DeviceForm {
            machine_type: Some(self.machine_type),
            uid: uid.to_string(),
            alias: self.alias,
            ip_addr: self.ip_addr,
            alt_firmware: self.alt_firmware,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List configured devices (PicoBrewC_Alt listed under PicoBrewC)
    DeviceList,
    /// Register a device alias
    DeviceRegister {
        /// Machine/Product ID
        #[arg(long)]
        uid: String,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Change the alias of a registered device (empty alias removes it)
    DeviceUpdate {
        uid: String,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Remove a device
    DeviceDelete {
        uid: String,
        /// Machine type; taken from the live session when omitted
        #[arg(long)]
        machine_type: Option<String>,
        #[arg(long, action = ArgAction::SetTrue)]
        alt_firmware: bool,
    },
    /// Print the configuration as currently stored
    ConfigShow,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let store = devreg::ConfigStore::open(devreg::YamlFile::new(&cli.config))
        .with_context(|| format!("loading configuration: {}", cli.config))?;
    let mut reconciler = DeviceReconciler::bootstrap(store);
    if let Some(dir) = &cli.archive_dir {
        reconciler = reconciler.with_stats(devreg::ArchiveStats::new(dir));
    }
    let hub = if cli.metrics {
        let hub = devreg::MetricsHub::new().map_err(anyhow::Error::msg)?;
        reconciler = reconciler.with_metrics(hub.clone());
        Some(hub)
    } else {
        None
    };

    let out = run(&mut reconciler, cli.command, cli.json)?;
    print!("{out}");
    if let Some(hub) = hub {
        print!("{}", hub.encode_text());
    }
    Ok(())
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn run<B: ConfigStorage>(
    reconciler: &mut DeviceReconciler<B>,
    command: Commands,
    json: bool,
) -> Result<String> {
    let action = match command {
        Commands::DeviceList => return render_view(&reconciler.view(), json),
        Commands::ConfigShow => {
            let cfg = reconciler.store().cached();
            return Ok(serde_yaml::to_string(&*cfg)?);
        }
        Commands::DeviceRegister { uid, form } => {
            DeviceAction::Register(form.into_form(&uid).into_register()?)
        }
        Commands::DeviceUpdate { uid, form } => {
            DeviceAction::Update(form.into_form(&uid).into_update(&uid)?)
        }
        Commands::DeviceDelete {
            uid,
            machine_type,
            alt_firmware,
        } => {
            let form = DeviceForm {
                machine_type,
                alt_firmware,
                ..DeviceForm::default()
            };
            DeviceAction::Delete {
                device_type: form.delete_type()?,
                uid,
            }
        }
    };

    info!(?action, "applying");
    match reconciler.apply(action)? {
        Reply::View(view) => render_view(&view, json),
        Reply::NoContent if json => Ok("{}\n".to_string()),
        Reply::NoContent => Ok("ok\n".to_string()),
    }
}

fn render_view(view: &DevicesView<'_>, json: bool) -> Result<String> {
    if json {
        let mut s = serde_json::to_string_pretty(view)?;
        s.push('\n');
        return Ok(s);
    }
    let mut out = String::new();
    for (ty, bucket) in view.aliases.iter() {
        for (uid, alias) in bucket {
            write!(out, "{ty}\t{uid}\t{alias}")?;
            if let Some(ip) = view
                .active_sessions
                .still
                .get(uid)
                .and_then(|s| s.ip_address.as_deref())
            {
                write!(out, "\tip={ip}")?;
            }
            if let Some(stats) = view.machine_stats.get(uid) {
                write!(
                    out,
                    "\tsessions={}\tdirty={}",
                    stats.total_sessions, stats.dirty_sessions_since_clean
                )?;
                if let Some(last) = &stats.last_session {
                    write!(out, "\tlast={}", last.name)?;
                }
            }
            out.push('\n');
        }
    }
    Ok(out)
}
