/// Block model generator and gallery manager entry point
use block_model_core::config::PipelineConfig;
use block_model_core::params::{CellCounts, GridParameters, PatternId, Vec3};
use block_model_core::scheduler::Progress;
use block_model_core::session::Session;
use block_model_core::{FileStore, SessionBuilder};
use constants::pattern::{DEFAULT_PATTERN, PATTERN_MAP};
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::path::Path;
use uuid::Uuid;

const CONFIG_FILE: &str = "block-model.json";
const DEFAULT_CELL_SIZE: f64 = 10.0;

fn usage(program: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("  {} generate <nx> <ny> <nz> [pattern] [cell_size]", program);
    eprintln!("  {} stats", program);
    eprintln!("  {} gallery list", program);
    eprintln!("  {} gallery save <name> <nx> <ny> <nz> [pattern]", program);
    eprintln!("  {} gallery replay <id>", program);
    eprintln!("  {} gallery delete <id>", program);
    eprintln!("  {} clear-cache", program);
    eprintln!();
    eprintln!("Patterns:");
    for info in PATTERN_MAP {
        eprintln!("  {:<18} {}", info.id, info.name);
    }
    std::process::exit(1);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("block-model", String::as_str);
    let rest: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();

    let config = PipelineConfig::load_or_default(Path::new(CONFIG_FILE))?;
    let store = FileStore::open(&config.storage.dir, config.storage.quota_bytes)?;
    let mut session = SessionBuilder::new(store).config(config).open();

    match rest.as_slice() {
        ["generate", nx, ny, nz, extra @ ..] => {
            let pattern = extra.first().copied().unwrap_or(DEFAULT_PATTERN);
            let cell_size = match extra.get(1) {
                Some(size) => size.parse()?,
                None => DEFAULT_CELL_SIZE,
            };
            let params = parse_params(nx, ny, nz, pattern, cell_size)?;
            generate(&mut session, params)?;
            export(&mut session)?;
        }
        ["stats"] => print_stats(&session),
        ["gallery", "list"] => list_gallery(&session),
        ["gallery", "save", name, nx, ny, nz, extra @ ..] => {
            let pattern = extra.first().copied().unwrap_or(DEFAULT_PATTERN);
            let params = parse_params(nx, ny, nz, pattern, DEFAULT_CELL_SIZE)?;
            generate(&mut session, params)?;
            let saved = session.save_to_gallery(name, None)?;
            if let Some(notice) = saved.notice {
                println!("Warning: {}", notice);
            }
            println!("Saved '{}' as {}", saved.model.name, saved.model.id);
        }
        ["gallery", "replay", id] => {
            let id: Uuid = id.parse()?;
            let replay = session.replay_from_gallery(id)?;
            println!(
                "Replaying '{}' ({})",
                replay.model.name, replay.model.stats.pattern_name
            );
            let mut job = replay.job;
            let pb = progress_bar(job.params().total_cells());
            loop {
                let step = job.step();
                update_progress(&pb, step.progress());
                if step.is_complete() {
                    break;
                }
            }
            pb.finish_with_message("Generated");
            let outcome = session.complete_generation(job)?;
            for notice in &outcome.notices {
                println!("Warning: {}", notice);
            }
            export(&mut session)?;
        }
        ["gallery", "delete", id] => {
            let id: Uuid = id.parse()?;
            if let Some(notice) = session.delete_from_gallery(id) {
                println!("Warning: {}", notice);
            }
            println!("Deleted {}", id);
        }
        ["clear-cache"] => {
            let removed = session.clear_cache()?;
            println!("Removed {} cached models", removed);
        }
        _ => usage(program),
    }

    Ok(())
}

fn parse_params(
    nx: &str,
    ny: &str,
    nz: &str,
    pattern: &str,
    cell_size: f64,
) -> Result<GridParameters, Box<dyn std::error::Error>> {
    let counts = CellCounts::new(nx.parse()?, ny.parse()?, nz.parse()?);
    let params = GridParameters::new(
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(cell_size, cell_size, cell_size),
        counts,
        PatternId::parse(pattern),
    )?;
    Ok(params)
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.green/blue}] {pos}/{len} cells ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message("Generating");
    pb
}

fn update_progress(pb: &ProgressBar, progress: Progress) {
    pb.set_position(progress.processed);
}

fn generate(session: &mut Session, params: GridParameters) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Generating {} cells ({})",
        params.total_cells(),
        params.pattern()
    );
    let pb = progress_bar(params.total_cells());
    let outcome = session.generate(params, |progress| update_progress(&pb, progress))?;
    pb.finish_with_message(if outcome.from_cache { "Cached" } else { "Generated" });

    for notice in &outcome.notices {
        println!("Warning: {}", notice);
    }
    Ok(())
}

fn export(session: &mut Session) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = session.export_current()?;
    for notice in &outcome.notices {
        println!("Warning: {}", notice);
    }
    let path = outcome.artifact.write_to(Path::new("."))?;
    println!("Exported {} ({})", path.display(), outcome.artifact.report);
    Ok(())
}

fn print_stats(session: &Session) {
    let stats = session.stats();
    println!("Models generated: {}", stats.total_models);
    println!("Exports: {}", stats.total_exports);
    println!("Largest model: {} blocks", stats.largest_model);
    println!("Average model: {:.0} blocks", stats.average_model_size);
    println!("Total volume: {:.0} m³", stats.total_volume);
    if let Some((pattern, count)) = stats.favourite_pattern() {
        println!("Favourite pattern: {} ({} models)", pattern, count);
    }
    if !stats.view_modes.is_empty() {
        let modes: Vec<&str> = stats.view_modes.iter().map(String::as_str).collect();
        println!("View modes: {}", modes.join(", "));
    }
    if !stats.tools_used.is_empty() {
        let tools: Vec<&str> = stats.tools_used.iter().map(String::as_str).collect();
        println!("Tools: {}", tools.join(", "));
    }
}

fn list_gallery(session: &Session) {
    let models = session.gallery();
    if models.is_empty() {
        println!("Gallery is empty");
        return;
    }
    for model in models {
        let counts = model.params.counts();
        println!(
            "{}  {}  {}x{}x{} {}  {} blocks  {}",
            model.id,
            model.date.format("%Y-%m-%d %H:%M"),
            counts.x,
            counts.y,
            counts.z,
            model.stats.pattern_name,
            model.stats.block_count,
            model.name
        );
    }
}
