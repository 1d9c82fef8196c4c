//! Command line entry point

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use kangaroo::config::{ephemeral_config, parse_config_file, parse_grid, Args};
use kangaroo::math::Secp256k1;
use kangaroo::workfile;
use kangaroo::{Coordinator, KeyOutcome, SearchParams};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let curve = Secp256k1::new();

    if args.check {
        kangaroo::check::self_test().context("self test failed")?;
        return Ok(());
    }
    if let Some(path) = &args.check_work_file {
        workfile::check_work_file(path, &curve, args.use_symmetry)
            .with_context(|| format!("{} failed the integrity check", path.display()))?;
        println!("{}: OK", path.display());
        return Ok(());
    }
    if let Some(path) = &args.work_info {
        workfile::work_info(path, &curve)?;
        return Ok(());
    }

    let params = SearchParams {
        dp_bits: args.dp.unwrap_or(-1),
        use_symmetry: args.use_symmetry,
        cpu_threads: args.threads.unwrap_or_else(num_cpus::get),
        cpu_group_size: 1024,
        gpu_backends: if args.gpu { vec![args.gpu_backend.clone()] } else { Vec::new() },
        gpu_grid: match &args.grid {
            Some(g) => parse_grid(g)?,
            None => (4, 4),
        },
        max_step: args.max_step,
        save_kangaroo: args.save_kangaroo,
        split_workfile: args.split_workfile,
        save_period: args.save_period,
        work_file: args.work_file.clone(),
        work_text_file: args.work_text_file.clone(),
        output_file: args.output_file.clone(),
    };

    // keep the ephemeral config alive until exit; dropping deletes it
    let _ephemeral = ephemeral_config(&args)?;

    let mut coordinator = if let Some(input) = &args.input_work_file {
        let loaded = workfile::load_work(input, &curve)?;
        info!("loaded work file {}", input.display());
        Coordinator::from_loaded(params, loaded)
    } else {
        let config_path = match (&_ephemeral, &args.config_file) {
            (Some(file), _) => file.path().to_path_buf(),
            (None, Some(path)) => path.clone(),
            (None, None) => bail!("no input file to process"),
        };
        let input = parse_config_file(&config_path, &curve)?;
        info!("start: {}", input.range_start.to_hex());
        info!("stop : {}", input.range_end.to_hex());
        info!("keys : {}", input.keys.len());
        Coordinator::new(params, input.range_start, input.range_end, input.keys)
    };

    let outcomes = coordinator.run()?;
    let solved = outcomes.iter().filter(|o| matches!(o, KeyOutcome::Solved(_))).count();
    info!("{solved}/{} keys solved", outcomes.len());
    Ok(())
}
