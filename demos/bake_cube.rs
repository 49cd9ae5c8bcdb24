//! Bake a closed cube and save the result to disk.
//!
//! Verifies the signed field is negative inside and positive outside, then
//! round-trips the asset through its file format.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use glam::{Mat4, Vec3};
use sdf_baker::{BakeSettings, GpuContext, SdfBaker, SourceMesh, TargetRendererInfo, VolumeAsset};

fn cube_mesh(half_extent: f32) -> SourceMesh {
    let h = half_extent;
    let positions = vec![
        Vec3::new(-h, -h, -h),
        Vec3::new(h, -h, -h),
        Vec3::new(h, h, -h),
        Vec3::new(-h, h, -h),
        Vec3::new(-h, -h, h),
        Vec3::new(h, -h, h),
        Vec3::new(h, h, h),
        Vec3::new(-h, h, h),
    ];
    let indices = vec![
        0, 2, 1, 0, 3, 2, // z = -h
        4, 5, 6, 4, 6, 7, // z = +h
        0, 1, 5, 0, 5, 4, // y = -h
        3, 7, 6, 3, 6, 2, // y = +h
        0, 4, 7, 0, 7, 3, // x = -h
        1, 2, 6, 1, 6, 5, // x = +h
    ];
    SourceMesh::single_submesh("cube", positions, indices).expect("Failed to build mesh")
}

fn main() -> Result<()> {
    env_logger::init();

    let output = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cube.sdfvol".to_string());

    println!("Baking a cube with half extent 0.2...");

    let context = GpuContext::new()?;
    println!("[OK] GPU device created");

    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        BakeSettings {
            pixel_size: 0.025,
            padding: 0.1,
            shrink_wrap_radius: 0.0,
        },
        vec![TargetRendererInfo::new(
            Arc::new(cube_mesh(0.2)),
            Mat4::IDENTITY,
        )],
        Vec3::ZERO,
    );
    baker.begin_bake()?;

    let mut ticks = 0u32;
    while !baker.do_work()? {
        ticks += 1;
    }
    println!("[OK] Bake finished in {} ticks", ticks);

    let asset = baker.take_bake_result().expect("Bake produced no asset");
    println!(
        "  Volume: {}x{}x{} voxels over a {:?} box",
        asset.dims.width,
        asset.dims.height,
        asset.dims.depth,
        asset.size()
    );

    let inside = asset.sample(Vec3::ZERO);
    let outside = asset.sample(Vec3::new(0.0, 0.0, 0.35));
    println!("  center: {:+.4} (expected negative)", inside);
    println!("  above +z face: {:+.4} (expected positive)", outside);
    assert!(inside < 0.0, "center of the cube should be inside");
    assert!(outside > 0.0, "point beyond the face should be outside");
    println!("[OK] Field is signed correctly");

    asset.save(Path::new(&output))?;
    let loaded = VolumeAsset::load(Path::new(&output))?;
    assert_eq!(loaded, asset);
    println!("[OK] Asset saved to {} and read back", output);

    println!("\n[OK] Cube bake completed!");
    Ok(())
}
