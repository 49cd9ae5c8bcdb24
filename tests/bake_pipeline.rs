//! End-to-end bakes against a real adapter. Every test skips cleanly on
//! machines without a GPU.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use sdf_baker::{
    BakeError, BakeSettings, GpuContext, SdfBaker, SourceMesh, TargetRendererInfo, VolumeAsset,
    VolumeDims,
};

const MAX_TICKS: usize = 10_000;

/// Coarse grid so the whole pipeline runs in a handful of dispatches.
fn coarse_settings(shrink_wrap_radius: f32) -> BakeSettings {
    BakeSettings {
        pixel_size: 0.1,
        padding: 0.2,
        shrink_wrap_radius,
    }
}

fn flat_triangle() -> Arc<SourceMesh> {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    let mesh = SourceMesh::single_submesh("triangle", positions, vec![0, 1, 2])
        .expect("triangle mesh is valid");
    Arc::new(mesh)
}

fn cube(half_extent: f32) -> Arc<SourceMesh> {
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
    let mesh = SourceMesh::single_submesh("cube", positions, indices).expect("cube mesh is valid");
    Arc::new(mesh)
}

/// Ticks the baker until it reports completion, checking that progress never
/// moves backwards and lands exactly at 1.0.
fn run_to_completion(baker: &mut SdfBaker) -> VolumeAsset {
    let mut previous = baker.percentage_done();
    for _ in 0..MAX_TICKS {
        let finished = baker.do_work().expect("bake tick failed");
        let progress = baker.percentage_done();
        assert!(
            progress >= previous - 1e-6,
            "progress went backwards: {previous} -> {progress}"
        );
        previous = progress;
        if finished {
            assert!(
                (progress - 1.0).abs() < 1e-6,
                "bake finished at progress {progress}"
            );
            return baker
                .take_bake_result()
                .expect("finished bake did not produce an asset");
        }
    }
    panic!("bake did not finish within {MAX_TICKS} ticks");
}

#[test]
fn flat_triangle_bake_produces_a_thin_field() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        coarse_settings(0.0),
        vec![TargetRendererInfo::new(flat_triangle(), Mat4::IDENTITY)],
        Vec3::ZERO,
    );
    baker.begin_bake().expect("bake should start");
    let asset = run_to_completion(&mut baker);

    // Padded bounds of the unit right triangle at 0.1 voxels.
    assert_eq!(asset.dims, VolumeDims::new(14, 14, 4));
    assert!((asset.lower_corner - Vec3::new(-0.2, -0.2, -0.2)).length() < 1e-4);

    // On the sheet itself the distance collapses to zero.
    let on_surface = asset.sample(Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0));
    assert!(on_surface.abs() < 0.05, "surface sample was {on_surface}");

    // The volume corner is well away from the nearest vertex, on the outside.
    let corner = asset.sample(Vec3::new(-0.2, -0.2, -0.2));
    assert!(
        corner > 0.2 && corner < 0.5,
        "corner sample was {corner}, expected roughly 0.35"
    );

    // The baked data survives a save/load round trip untouched.
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("triangle.sdfvol");
    asset.save(&path).expect("save asset");
    let loaded = VolumeAsset::load(&path).expect("load asset");
    assert_eq!(loaded, asset);

    // Rerunning the same configuration reproduces the field bit for bit.
    baker.begin_bake().expect("second bake should start");
    let again = run_to_completion(&mut baker);
    assert_eq!(again, asset);
}

#[test]
fn cube_bake_is_negative_inside_and_positive_outside() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    // The renderer sits away from the origin; baking is relative to the root
    // position, so the asset comes out centered all the same.
    let root = Vec3::new(5.0, 5.0, 5.0);
    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        coarse_settings(0.0),
        vec![TargetRendererInfo::new(
            cube(0.2),
            Mat4::from_translation(root),
        )],
        root,
    );
    baker.begin_bake().expect("bake should start");
    let asset = run_to_completion(&mut baker);

    assert_eq!(asset.dims, VolumeDims::new(8, 8, 8));
    assert!((asset.lower_corner - Vec3::splat(-0.4)).length() < 1e-4);

    // Cube center: 0.2 from every face, inside.
    let center = asset.sample(Vec3::ZERO);
    assert!(
        center < -0.15 && center > -0.25,
        "center sample was {center}, expected roughly -0.2"
    );

    // A grid point 0.1 beyond the +z face, outside.
    let outside = asset.sample(Vec3::new(0.0, 0.0, 0.3));
    assert!(
        outside > 0.05 && outside < 0.15,
        "outside sample was {outside}, expected roughly 0.1"
    );
}

#[test]
fn shrink_wrap_pass_preserves_the_sign_of_the_field() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        coarse_settings(0.15),
        vec![TargetRendererInfo::new(cube(0.2), Mat4::IDENTITY)],
        Vec3::ZERO,
    );
    baker.begin_bake().expect("bake should start");
    let asset = run_to_completion(&mut baker);

    // The recomputed field moves values around near the surface but must not
    // flip deep interior or exterior samples.
    let center = asset.sample(Vec3::ZERO);
    assert!(center < -0.05, "center sample was {center}");

    let outside = asset.sample(Vec3::new(0.0, 0.0, 0.3));
    assert!(outside > 0.01, "outside sample was {outside}");
}

#[test]
fn multiple_renderers_weld_into_one_field() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    let triangle = flat_triangle();
    let shifted = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));

    // A disabled renderer far away must not stretch the volume.
    let mut ignored = TargetRendererInfo::new(cube(0.2), Mat4::from_translation(Vec3::splat(50.0)));
    ignored.enabled = false;

    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        coarse_settings(0.0),
        vec![
            TargetRendererInfo::new(triangle.clone(), Mat4::IDENTITY),
            TargetRendererInfo::new(triangle, shifted),
            ignored,
        ],
        Vec3::ZERO,
    );
    baker.begin_bake().expect("bake should start");
    let asset = run_to_completion(&mut baker);

    // Bounds cover both triangles (x spans 0..2) and nothing else.
    assert_eq!(asset.dims, VolumeDims::new(24, 14, 4));

    // Both sheets register as surface.
    let first = asset.sample(Vec3::new(1.0 / 3.0, 1.0 / 3.0, 0.0));
    let second = asset.sample(Vec3::new(1.0 + 1.0 / 3.0, 1.0 / 3.0, 0.0));
    assert!(first.abs() < 0.05, "first sheet sample was {first}");
    assert!(second.abs() < 0.05, "second sheet sample was {second}");
}

#[test]
fn bake_refuses_to_start_without_geometry() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    let mut baker = SdfBaker::new(context);
    assert!(baker.begin_bake().is_err());
    assert!(baker.is_waiting());

    // A disabled renderer contributes no triangles either.
    let mut target = TargetRendererInfo::new(flat_triangle(), Mat4::IDENTITY);
    target.enabled = false;
    baker.attempt_save_settings(coarse_settings(0.0), vec![target], Vec3::ZERO);
    assert!(baker.begin_bake().is_err());
    assert!(baker.is_waiting());
    assert_eq!(baker.percentage_done(), 0.0);
}

#[test]
fn invalid_settings_never_leave_waiting() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    let mut settings = coarse_settings(0.0);
    settings.pixel_size = 0.0;

    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        settings,
        vec![TargetRendererInfo::new(flat_triangle(), Mat4::IDENTITY)],
        Vec3::ZERO,
    );
    match baker.begin_bake() {
        Err(BakeError::InvalidSettings(_)) => {}
        other => panic!("expected InvalidSettings, got {other:?}"),
    }
    assert!(baker.is_waiting());
}

#[test]
fn settings_are_locked_while_a_bake_runs() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    let mut baker = SdfBaker::new(context);
    let target = TargetRendererInfo::new(flat_triangle(), Mat4::IDENTITY);

    assert!(baker.attempt_save_settings(coarse_settings(0.0), vec![target.clone()], Vec3::ZERO));
    // Re-staging the identical configuration reports no change.
    assert!(!baker.attempt_save_settings(coarse_settings(0.0), vec![target.clone()], Vec3::ZERO));

    baker.begin_bake().expect("bake should start");
    assert!(!baker.attempt_save_settings(coarse_settings(0.0), vec![target.clone()], Vec3::ONE));
    assert_eq!(baker.root_position(), Vec3::ZERO);

    let _asset = run_to_completion(&mut baker);
    // Still refused after completion, until the baker is reset.
    assert!(!baker.attempt_save_settings(coarse_settings(0.0), vec![target.clone()], Vec3::ONE));

    baker.cleanup_and_reset();
    assert!(baker.is_waiting());
    assert!(baker.attempt_save_settings(coarse_settings(0.0), vec![target], Vec3::ONE));
    assert_eq!(baker.root_position(), Vec3::ONE);
}

#[test]
fn cleanup_mid_bake_allows_a_fresh_start() {
    let context = match GpuContext::new() {
        Ok(context) => context,
        Err(err) => {
            eprintln!("No adapter available for bake pipeline test: {err:?}");
            return;
        }
    };

    let mut baker = SdfBaker::new(context);
    baker.attempt_save_settings(
        coarse_settings(0.0),
        vec![TargetRendererInfo::new(cube(0.2), Mat4::IDENTITY)],
        Vec3::ZERO,
    );

    baker.begin_bake().expect("bake should start");
    for _ in 0..5 {
        baker.do_work().expect("bake tick failed");
    }
    assert!(!baker.is_waiting());
    assert!(baker.sdf_lower_corner().is_some());

    baker.cleanup_and_reset();
    assert!(baker.is_waiting());
    assert_eq!(baker.percentage_done(), 0.0);
    assert!(baker.sdf_lower_corner().is_none());
    assert!(baker.bake_result().is_none());

    baker.begin_bake().expect("second bake should start");
    let asset = run_to_completion(&mut baker);
    assert_eq!(asset.dims, VolumeDims::new(8, 8, 8));
}
