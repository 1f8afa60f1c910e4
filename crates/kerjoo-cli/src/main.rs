mod client;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use kerjoo_core::engine::start_requires_presence;
use kerjoo_core::{
    format_hms, AssignmentId, Evidence, Geofence, ItemId, NewAssignment, Photo, PhotoSlot, RequirementProfile, TaskDefId,
    UserId,
};
use kerjoo_workflow::{now_unix, Site, Transition};

use client::{explain, gate, PositionArgs};

#[derive(Parser)]
#[command(name = "kerjoo", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum SlotArg {
    Before,
    After,
}

impl From<SlotArg> for PhotoSlot {
    fn from(s: SlotArg) -> Self {
        match s {
            SlotArg::Before => PhotoSlot::Before,
            SlotArg::After => PhotoSlot::After,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Initialize a site in the current directory (creates .kerjoo/, config, db)
    Init,

    /// Show site config, task definitions and, with --worker, their assignments
    Status {
        #[arg(long)]
        worker: Option<String>,
    },

    /// Define a task and what its items need before they can be completed
    TaskAdd {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        category: String,
        #[arg(long)]
        photo: bool,
        #[arg(long)]
        file: bool,
        #[arg(long)]
        text: bool,
    },

    /// Assign a task to a worker with a checklist
    Assign {
        #[arg(long)]
        task: String,
        #[arg(long)]
        worker: String,
        #[arg(long, default_value = "admin")]
        assigner: String,
        /// Checklist line; repeat for more
        #[arg(long = "item", required = true)]
        items: Vec<String>,
        #[arg(long)]
        due_in_hours: Option<u32>,
        #[arg(long, default_value = "")]
        note: String,
        /// Target latitude of the site
        #[arg(long, requires = "target_lon", allow_hyphen_values = true)]
        target_lat: Option<f64>,
        #[arg(long, requires = "target_lat", allow_hyphen_values = true)]
        target_lon: Option<f64>,
        #[arg(long)]
        radius: Option<u32>,
        #[arg(long)]
        place: Option<String>,
    },

    /// Print one assignment with its checklist
    Show {
        #[arg(long)]
        assignment: String,
    },

    /// Append a checklist line to an open assignment
    ItemAdd {
        #[arg(long)]
        assignment: String,
        #[arg(long)]
        name: String,
    },

    Start {
        #[arg(long)]
        item: String,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Resume a paused item
    Resume {
        #[arg(long)]
        item: String,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Pause the running timer of an item
    Stop {
        #[arg(long)]
        item: String,
    },

    /// Put an in-progress item back to pending (keeps recorded time)
    Reset {
        #[arg(long)]
        item: String,
    },

    /// Attach a before/after photo reference
    Photo {
        #[arg(long)]
        item: String,
        #[arg(long, value_enum)]
        slot: SlotArg,
        #[arg(long)]
        reference: String,
        #[command(flatten)]
        position: PositionArgs,
    },

    Complete {
        #[arg(long)]
        item: String,
        #[arg(long)]
        photo_before: Option<String>,
        #[arg(long)]
        photo_after: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[command(flatten)]
        position: PositionArgs,
    },

    /// Server view of an item's timer
    Elapsed {
        #[arg(long)]
        item: String,
        #[arg(long)]
        json: bool,
    },

    /// Local timer, reconciled with the server
    Timer,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let site_root = std::env::current_dir()?;

    match cli.cmd {
        Command::Init => {
            Site::init(&site_root)?;
            println!("Initialized Kerjoo site in {}", site_root.display());
        }
        Command::Status { worker } => {
            let site = Site::open(site_root)?;
            println!("Site: {} ({})", site.cfg.site.name, site.cfg.site.id);
            let tasks = site.workflow.task_definitions().map_err(explain)?;
            println!("Task definitions: {}", tasks.len());
            for t in tasks {
                let r = t.requirements;
                println!("- {} {} [photo={} file={} text={}]", t.id, t.name, r.requires_photo, r.requires_file, r.requires_text_summary);
            }
            if let Some(worker) = worker {
                let listings = site.workflow.assignments_for(&UserId::from_str(worker.as_str())).map_err(explain)?;
                println!("Assignments for {}: {}", worker, listings.len());
                for l in listings {
                    let overdue = if l.overdue { " OVERDUE" } else { "" };
                    println!("- {} [{}]{}", l.assignment.id, l.assignment.status, overdue);
                }
            }
        }
        Command::TaskAdd { name, category, photo, file, text } => {
            let site = Site::open(site_root)?;
            let requirements = RequirementProfile { requires_photo: photo, requires_file: file, requires_text_summary: text };
            let task = site.workflow.create_task_definition(&name, &category, requirements).map_err(explain)?;
            println!("Added task {}", task.id);
        }
        Command::Assign { task, worker, assigner, items, due_in_hours, note, target_lat, target_lon, radius, place } => {
            let site = Site::open(site_root)?;
            let geofence = match (target_lat, target_lon) {
                (Some(lat), Some(lon)) => Some(Geofence {
                    center: kerjoo_core::Coordinates { lat, lon },
                    radius_m: radius.unwrap_or(site.cfg.site.default_radius_m),
                    name: place,
                }),
                _ => None,
            };
            let snap = site
                .workflow
                .create_assignment(NewAssignment {
                    task_id: TaskDefId::from_str(task),
                    worker_id: UserId::from_str(worker),
                    assigner_id: UserId::from_str(assigner),
                    deadline_unix: due_in_hours.map(|h| now_unix() + i64::from(h) * 3600),
                    note,
                    geofence,
                    items,
                })
                .map_err(explain)?;
            println!("Assignment {}", snap.assignment.id);
            for item in &snap.items {
                println!("- item {} {}", item.id, item.name);
            }
        }
        Command::Show { assignment } => {
            let site = Site::open(site_root)?;
            let snap = site.workflow.assignment(&AssignmentId::from_str(assignment)).map_err(explain)?;
            let now = now_unix();
            let a = &snap.assignment;
            println!("Assignment {} [{}] task={} worker={}", a.id, a.status, snap.task.name, a.worker_id);
            if let Some(fence) = &a.geofence {
                println!("Target: {:.6},{:.6} r={}m", fence.center.lat, fence.center.lon, fence.radius_m);
            }
            if a.is_overdue(now) {
                println!("OVERDUE");
            }
            for item in &snap.items {
                let running = if item.is_running() { " running" } else { "" };
                println!("- {} {} [{}] {}{}", item.id, item.name, item.status, format_hms(item.elapsed_secs(now)), running);
            }
        }
        Command::ItemAdd { assignment, name } => {
            let site = Site::open(site_root)?;
            let item = site.workflow.append_item(&AssignmentId::from_str(assignment), &name).map_err(explain)?;
            println!("Added item {}", item.id);
        }
        Command::Start { item, position } => {
            let site = Site::open(site_root)?;
            let id = ItemId::from_str(item);
            let snap = site.workflow.snapshot_for_item(&id).map_err(explain)?;
            let fence = snap.assignment.geofence.as_ref().filter(|_| start_requires_presence(&snap));
            let coords = gate(&site.cfg.location, position, fence).await?;
            let t = site.workflow.start(&id, coords).map_err(explain)?;
            site.timer.reconcile(&site.workflow.elapsed(&id).map_err(explain)?)?;
            print_transition("Started", &t);
        }
        Command::Resume { item, position } => {
            let site = Site::open(site_root)?;
            let id = ItemId::from_str(item);
            let snap = site.workflow.snapshot_for_item(&id).map_err(explain)?;
            let fence = snap.assignment.geofence.as_ref().filter(|_| start_requires_presence(&snap));
            let coords = gate(&site.cfg.location, position, fence).await?;
            let t = site.workflow.resume(&id, coords).map_err(explain)?;
            site.timer.reconcile(&site.workflow.elapsed(&id).map_err(explain)?)?;
            print_transition("Resumed", &t);
        }
        Command::Stop { item } => {
            let site = Site::open(site_root)?;
            let id = ItemId::from_str(item);
            let t = site.workflow.stop(&id).map_err(explain)?;
            site.timer.reconcile(&site.workflow.elapsed(&id).map_err(explain)?)?;
            print_transition("Paused", &t);
        }
        Command::Reset { item } => {
            let site = Site::open(site_root)?;
            let id = ItemId::from_str(item);
            let t = site.workflow.reset(&id).map_err(explain)?;
            forget_timer(&site, &id)?;
            print_transition("Reset", &t);
        }
        Command::Photo { item, slot, reference, position } => {
            let site = Site::open(site_root)?;
            let id = ItemId::from_str(item);
            let snap = site.workflow.snapshot_for_item(&id).map_err(explain)?;
            let coords = gate(&site.cfg.location, position, snap.assignment.geofence.as_ref()).await?;
            let t = site.workflow.capture_photo(&id, slot.into(), &reference, coords).map_err(explain)?;
            print_transition("Photo saved", &t);
        }
        Command::Complete { item, photo_before, photo_after, file, summary, position } => {
            let site = Site::open(site_root)?;
            let id = ItemId::from_str(item);
            let coords = if photo_before.is_some() || photo_after.is_some() {
                let snap = site.workflow.snapshot_for_item(&id).map_err(explain)?;
                gate(&site.cfg.location, position, snap.assignment.geofence.as_ref()).await?
            } else {
                None
            };
            let photo = |reference: String| Photo { reference, position: coords };
            let evidence = Evidence {
                photo_before: photo_before.map(photo),
                photo_after: photo_after.map(photo),
                file_ref: file,
                summary,
            };
            let t = site.workflow.complete(&id, evidence).map_err(explain)?;
            forget_timer(&site, &id)?;
            print_transition("Completed", &t);
        }
        Command::Elapsed { item, json } => {
            let site = Site::open(site_root)?;
            let view = site.workflow.elapsed(&ItemId::from_str(item)).map_err(explain)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                let state = if view.running { "running" } else { "paused" };
                println!("{} [{}] {} {}", view.item_id, view.status, format_hms(view.elapsed_secs), state);
            }
        }
        Command::Timer => {
            let site = Site::open(site_root)?;
            let local = site.timer.load()?;
            let Some(active) = local.active_item.clone() else {
                println!("No active timer");
                return Ok(());
            };
            let view = site.workflow.elapsed(&active).map_err(explain)?;
            let state = site.timer.reconcile(&view)?;
            let label = if state.running { "running" } else { "paused" };
            println!("{} {} {}", active, format_hms(state.elapsed_secs(now_unix())), label);
        }
    }

    Ok(())
}

fn forget_timer(site: &Site, item: &ItemId) -> Result<()> {
    if site.timer.load()?.is_tracking(item) {
        site.timer.clear()?;
    }
    Ok(())
}

fn print_transition(verb: &str, t: &Transition) {
    println!(
        "{} item {} [{}] {}; assignment {} [{}]",
        verb,
        t.item.id,
        t.item.status,
        format_hms(t.item.duration_secs),
        t.assignment.id,
        t.assignment.status
    );
    if t.assignment.status == kerjoo_core::Status::Done {
        println!("All items done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn negative_coordinates_parse() {
        let cli = Cli::try_parse_from(["kerjoo", "start", "--item", "i1", "--lat", "-6.2", "--lon", "106.8"]).unwrap();
        let Command::Start { position, .. } = cli.cmd else { panic!("not start") };
        assert_eq!(position.fix().map(|f| f.coords.lat), Some(-6.2));
    }

    #[test]
    fn lat_without_lon_is_rejected() {
        assert!(Cli::try_parse_from(["kerjoo", "start", "--item", "i1", "--lat", "-6.2"]).is_err());
    }
}
