//! Headless debris demo.
//!
//! Blasts a crater into a slab of terrain once a second and logs the pool
//! counts as the debris flies, piles up and settles. Runs on the host
//! back-end by default; pass `--gpu` to run the same scene on wgpu.
//!
//! ```text
//! RUST_LOG=debug cargo run --bin debris-demo -- --gpu
//! ```

use debris::gpu::GpuDebris;
use debris::prelude::*;

const FRAMES: u32 = 600;
const EXPLOSION_EVERY: u32 = 60;
const TERRAIN_SIZE: u32 = 256;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let use_gpu = std::env::args().skip(1).any(|arg| arg == "--gpu");
    if let Err(e) = run(use_gpu) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

/// Bottom `surface` rows solid, striped by depth.
fn slab(size: u32, surface: u32) -> Result<TerrainField, ConfigError> {
    TerrainField::from_fn(size, size, |_, y| {
        (y < surface).then(|| {
            let shade = 90 + (y % 16) as u8 * 4;
            pack_rgba(shade + 40, shade, shade / 2 + 20, 255)
        })
    })
}

/// Where the explosion of a given frame goes off, walking across the slab.
fn blast_site(frame: u32) -> Vec2 {
    let n = (frame / EXPLOSION_EVERY) as f32;
    let x = (n * 37.0) % 160.0 - 80.0;
    Vec2::new(x, -24.0)
}

fn run(use_gpu: bool) -> Result<(), DebrisError> {
    let terrain = slab(TERRAIN_SIZE, 112)?;
    let config = DebrisConfig::new(1 << 14)
        .with_variant(Variant::TerrainCoupled)
        .with_bounds(Bounds::centered(Vec2::splat(TERRAIN_SIZE as f32)));

    if use_gpu {
        run_gpu(config, &terrain)
    } else {
        run_host(config, terrain)
    }
}

fn run_host(config: DebrisConfig, terrain: TerrainField) -> Result<(), DebrisError> {
    let dt = config.timestep;
    let mut debris = CoupledDebris::new(config, terrain::shared(terrain))?;
    let mut clock = FrameClock::new();
    let mut busy = 0.0;

    for frame in 0..FRAMES {
        if frame % EXPLOSION_EVERY == 0 {
            debris.emit_explosion(blast_site(frame), 10.0);
        }
        clock.tick();
        debris.update(dt);
        busy += clock.tick();

        if frame % EXPLOSION_EVERY == EXPLOSION_EVERY - 1 {
            let counts = debris.counts();
            log::info!(
                "frame {:4}: {:5} alive, {:5} dead, {:5} deposited, {:.2} ms/frame",
                frame + 1,
                counts.alive,
                counts.dead,
                debris.deposited(),
                busy * 1000.0 / EXPLOSION_EVERY as f32
            );
            busy = 0.0;
        }
    }
    Ok(())
}

fn run_gpu(config: DebrisConfig, terrain: &TerrainField) -> Result<(), DebrisError> {
    let dt = config.timestep;
    let mut debris = GpuDebris::headless(config, terrain)?;
    let mut clock = FrameClock::new();
    let mut busy = 0.0;

    for frame in 0..FRAMES {
        if frame % EXPLOSION_EVERY == 0 {
            debris.emit_explosion(blast_site(frame), 10.0);
        }
        clock.tick();
        debris.update(dt);
        busy += clock.tick();

        if frame % EXPLOSION_EVERY == EXPLOSION_EVERY - 1 {
            let counts = debris.read_counts()?;
            log::info!(
                "frame {:4}: {:5} alive, {:5} dead, {:.2} ms/frame submitted",
                frame + 1,
                counts.alive,
                counts.dead,
                busy * 1000.0 / EXPLOSION_EVERY as f32
            );
            busy = 0.0;
        }
    }
    Ok(())
}
