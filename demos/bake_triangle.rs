//! Bake a single triangle into a signed distance volume.
//!
//! This example walks the staged pipeline tick by tick and prints the stage
//! transitions as they happen.

use std::sync::Arc;

use anyhow::Result;
use glam::{Mat4, Vec3};
use sdf_baker::{BakeSettings, GpuContext, SdfBaker, SourceMesh, TargetRendererInfo};

fn main() -> Result<()> {
    env_logger::init();

    println!("Baking a unit right triangle...");

    let context = GpuContext::new()?;
    println!("[OK] GPU device created");

    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    let mesh = SourceMesh::single_submesh("triangle", positions, vec![0, 1, 2])?;
    let target = TargetRendererInfo::new(Arc::new(mesh), Mat4::IDENTITY);

    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        BakeSettings {
            pixel_size: 0.05,
            padding: 0.2,
            shrink_wrap_radius: 0.0,
        },
        vec![target],
        Vec3::ZERO,
    );
    baker.begin_bake()?;
    println!("[OK] Bake started");

    let mut stage = baker.stage();
    let mut ticks = 0u32;
    loop {
        let finished = baker.do_work()?;
        ticks += 1;

        let current = baker.stage();
        if current != stage {
            println!(
                "  {:?} -> {:?} at tick {} ({:.0}%)",
                stage,
                current,
                ticks,
                baker.percentage_done() * 100.0
            );
            stage = current;
        }
        if finished {
            break;
        }
    }
    println!("[OK] Bake finished in {} ticks", ticks);

    let asset = baker.take_bake_result().expect("Bake produced no asset");
    println!(
        "  Volume: {}x{}x{} voxels, lower corner {:?}",
        asset.dims.width, asset.dims.height, asset.dims.depth, asset.lower_corner
    );

    for point in [
        Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0),
        Vec3::new(0.5, 0.0, 0.0),
        Vec3::new(-0.2, -0.2, -0.2),
    ] {
        println!("  distance at {:?} = {:+.4}", point, asset.sample(point));
    }

    println!("\n[OK] Triangle bake completed!");
    Ok(())
}
