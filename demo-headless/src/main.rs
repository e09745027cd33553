//! Headless groundwater simulation demo: generates a plot of land, fills in
//! the ground, optionally plants a crop per quadrant, and runs the flow
//! engine for a configurable stretch of simulated time.

use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use groundwater_sim_core::crops::{self, Quadrant};
use groundwater_sim_core::{terrain, Farm, FlowConfig, PlantSpecies, Soil, WaterFlow};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Groundwater transport simulation demo with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "groundwater-demo")]
#[command(about = "Farm groundwater transport simulation demo", long_about = None)]
struct Args {
    /// Simulated duration in seconds (default is about seven months)
    #[arg(short, long, default_value_t = 18_408_206)]
    duration: u64,

    /// Terrain RNG seed; equal seeds reproduce the same plot
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Simulated seconds per step
    #[arg(long, default_value_t = 1000)]
    time_step: u64,

    /// Worker threads the grid is partitioned across (1, 2 or 4)
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Disable the periodic rain events
    #[arg(long)]
    no_rain: bool,

    /// Disable plant uptake and growth
    #[arg(long)]
    no_plants: bool,

    /// Seed random initial water into the ground
    #[arg(long)]
    initial_water: bool,

    /// Crop planted in every quadrant (pintobeans, sunflower, amaranth,
    /// chile, sweetcorn, summersquash, wintersquash, potatoes, sweetpepper)
    #[arg(short, long, default_value = "chile")]
    crop: String,
}

fn parse_species(name: &str) -> Option<PlantSpecies> {
    match name.to_ascii_lowercase().as_str() {
        "pintobeans" => Some(PlantSpecies::PintoBeans),
        "sunflower" => Some(PlantSpecies::Sunflower),
        "amaranth" => Some(PlantSpecies::Amaranth),
        "chile" => Some(PlantSpecies::Chile),
        "sweetcorn" => Some(PlantSpecies::SweetCorn),
        "summersquash" => Some(PlantSpecies::SummerSquash),
        "wintersquash" => Some(PlantSpecies::WinterSquash),
        "potatoes" => Some(PlantSpecies::Potatoes),
        "sweetpepper" => Some(PlantSpecies::SweetPepper),
        _ => None,
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let Some(species) = parse_species(&args.crop) else {
        eprintln!("unknown crop '{}'", args.crop);
        process::exit(1);
    };

    println!("=== Groundwater Simulation Demo ===\n");
    println!("INITIALIZATIONS");

    let started = Instant::now();
    let mut farm = terrain::generate_farm(args.seed);
    println!("  ...topography : {} ms", started.elapsed().as_millis());
    println!(
        "    {} cells in system",
        Farm::SIZE * Farm::SIZE * farm.z_count()
    );

    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(args.seed);
    for z in 0..farm.z_count() {
        for y in 0..Farm::SIZE {
            for x in 0..Farm::SIZE {
                if let Some(cell) = farm.cell_mut(x, y, z) {
                    cell.set_soil(Soil::GilaSand);
                    if args.initial_water && rng.random::<f64>() < 0.75 {
                        cell.set_water_volume(f64::from(rng.random_range(0..100_u32)));
                    }
                }
            }
        }
    }
    if !args.no_plants {
        for quadrant in Quadrant::ALL {
            let planted = crops::plant_quadrant(&mut farm, quadrant, species);
            println!("    {planted} {species:?} plants in {quadrant:?}");
        }
    }
    println!("  ...ground     : {} ms", started.elapsed().as_millis());

    let started = Instant::now();
    let config = FlowConfig {
        time_step_secs: args.time_step,
        worker_count: args.workers,
        rain_enabled: !args.no_rain,
        plants_enabled: !args.no_plants,
        ..FlowConfig::default()
    };
    let farm = Arc::new(farm);
    let mut flow = match WaterFlow::new(Arc::clone(&farm), config) {
        Ok(flow) => flow,
        Err(error) => {
            eprintln!("failed to start flow engine: {error}");
            process::exit(1);
        }
    };
    println!("  ...flow       : {} ms", started.elapsed().as_millis());

    println!("\nStarting model\n");
    let started = Instant::now();
    flow.run(args.duration);
    println!(
        "\nSimulated {} seconds in {} seconds",
        flow.simulated_time(),
        started.elapsed().as_secs()
    );
    println!("Total water in system: {:.3} mL", flow.total_system_water());
    if !args.no_plants {
        for quadrant in Quadrant::ALL {
            println!(
                "  {:?}: {} living plants",
                quadrant,
                crops::living_plants(&farm, quadrant)
            );
        }
    }

    flow.shutdown();
    println!("done");
}
