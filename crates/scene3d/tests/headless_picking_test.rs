//! Headless rendering and GPU picking integration tests.
//!
//! These tests need a GPU adapter (real or software fallback). Without one,
//! engine creation fails and the tests return early with a message.

use std::sync::{Arc, Mutex};

use pollster::FutureExt;
use scene3d::*;

const WIDTH: u32 = 200;
const HEIGHT: u32 = 150;
const CENTER: (f64, f64) = (100.5, 75.5);

/// Looks along +y at the origin; world x maps to screen right, z to screen up.
fn camera() -> CameraState {
    CameraState::looking_at(Vec3::new(0.0, -10.0, 0.0), Vec3::ZERO)
}

fn headless_scene() -> Option<Scene3d> {
    match Scene3d::headless(WIDTH, HEIGHT, EngineOptions::default()).block_on() {
        Ok(scene) => Some(scene),
        Err(e) => {
            eprintln!("Skipping headless tests: no GPU adapter available ({e})");
            None
        }
    }
}

type Log<T> = Arc<Mutex<Vec<T>>>;

struct Recorded {
    hovers: Log<(usize, Option<usize>)>,
    clicks: Log<(usize, usize)>,
}

impl Recorded {
    fn new() -> Self {
        Self {
            hovers: Arc::default(),
            clicks: Arc::default(),
        }
    }

    fn hook(&self, collection: usize, primitive: PrimitiveCollection) -> PrimitiveCollection {
        let hovers = Arc::clone(&self.hovers);
        let clicks = Arc::clone(&self.clicks);
        primitive
            .on_hover(move |i| hovers.lock().unwrap().push((collection, i)))
            .on_click(move |i| clicks.lock().unwrap().push((collection, i)))
    }

    fn take_hovers(&self) -> Vec<(usize, Option<usize>)> {
        std::mem::take(&mut *self.hovers.lock().unwrap())
    }

    fn take_clicks(&self) -> Vec<(usize, usize)> {
        std::mem::take(&mut *self.clicks.lock().unwrap())
    }
}

/// Three points (x = +3, x = -3, z = +3) and two boxes (origin, z = -3).
fn sample_scene(recorded: &Recorded) -> Vec<PrimitiveCollection> {
    let points = PointCloud::from_points(&[
        Vec3::new(3.0, 0.0, 0.0),
        Vec3::new(-3.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, 3.0),
    ])
    .with_size(1.0)
    .with_color([0.9, 0.1, 0.1]);
    let boxes = Cuboid::from_centers(&[Vec3::ZERO, Vec3::new(0.0, 0.0, -3.0)])
        .with_size([1.0, 1.0, 1.0])
        .with_colors(vec![0.1, 0.2, 0.9, 0.1, 0.8, 0.2]);
    vec![
        recorded.hook(0, points.into()),
        recorded.hook(1, boxes.into()),
    ]
}

/// Screen position of world point `(x, 0, z)` under [`camera`].
fn project(x: f32, z: f32) -> (f64, f64) {
    let clip = camera().view_projection_matrix(WIDTH as f32 / HEIGHT as f32) * Vec4::new(x, 0.0, z, 1.0);
    let ndc = clip / clip.w;
    (
        f64::from((ndc.x + 1.0) * 0.5 * WIDTH as f32),
        f64::from((1.0 - ndc.y) * 0.5 * HEIGHT as f32),
    )
}

fn target(collection_index: usize, instance_index: usize) -> Option<PickTarget> {
    Some(PickTarget {
        collection_index,
        instance_index,
    })
}

fn click(scene: &mut Scene3d, (x, y): (f64, f64)) -> Option<PickTarget> {
    scene.pick(x, y, PickMode::Click).block_on()
}

fn hover(scene: &mut Scene3d, (x, y): (f64, f64)) -> Option<PickTarget> {
    scene.pick(x, y, PickMode::Hover).block_on()
}

#[test]
fn headless_picking_tests() {
    let Some(mut scene) = headless_scene() else {
        return;
    };
    let recorded = Recorded::new();
    let collections = sample_scene(&recorded);
    scene
        .render(&collections, &camera(), (WIDTH, HEIGHT))
        .expect("render failed");

    // --- IDs: 3 points then 2 boxes ---
    {
        let mapping = scene.engine().id_mapping();
        assert_eq!(mapping.base_id(0), Some(1));
        assert_eq!(mapping.base_id(1), Some(4));
        assert_eq!(scene.engine().render_objects().len(), 2);
    }

    // --- Click hits ---
    {
        assert_eq!(click(&mut scene, CENTER), target(1, 0));
        assert_eq!(click(&mut scene, project(0.0, -3.0)), target(1, 1));
        assert_eq!(click(&mut scene, project(3.0, 0.0)), target(0, 0));
        assert_eq!(click(&mut scene, project(0.0, 3.0)), target(0, 2));
        assert_eq!(recorded.take_clicks(), vec![(1, 0), (1, 1), (0, 0), (0, 2)]);
    }

    // --- Misses resolve to nothing and fire nothing ---
    {
        assert_eq!(click(&mut scene, (2.0, 2.0)), None);
        assert!(recorded.take_clicks().is_empty());
    }

    // --- Hover fires only on changes ---
    {
        assert_eq!(hover(&mut scene, project(-3.0, 0.0)), target(0, 1));
        assert_eq!(hover(&mut scene, project(-3.0, 0.0)), target(0, 1));
        assert_eq!(recorded.take_hovers(), vec![(0, Some(1))]);

        // Same collection: the old instance is left before the new one enters
        assert_eq!(hover(&mut scene, project(3.0, 0.0)), target(0, 0));
        assert_eq!(recorded.take_hovers(), vec![(0, None), (0, Some(0))]);

        assert_eq!(hover(&mut scene, CENTER), target(1, 0));
        assert_eq!(recorded.take_hovers(), vec![(0, None), (1, Some(0))]);

        assert_eq!(hover(&mut scene, (2.0, 2.0)), None);
        assert_eq!(recorded.take_hovers(), vec![(1, None)]);
    }

    // --- Out-of-viewport hover clears without a GPU pass ---
    {
        assert_eq!(hover(&mut scene, CENTER), target(1, 0));
        recorded.take_hovers();
        let passes = scene.engine().pick_passes_started();
        let request = scene.engine_mut().begin_pick(-4.0, 10.0, PickMode::Hover);
        assert_eq!(request, PickRequest::OutOfBounds);
        assert_eq!(scene.engine().pick_passes_started(), passes);
        assert_eq!(recorded.take_hovers(), vec![(1, None)]);
    }

    // --- A second pick while one is in flight starts no pass ---
    {
        let passes = scene.engine().pick_passes_started();
        let first = scene.engine_mut().begin_pick(CENTER.0, CENTER.1, PickMode::Click);
        assert!(matches!(first, PickRequest::Started(_)));
        let second = scene.engine_mut().begin_pick(CENTER.0, CENTER.1, PickMode::Click);
        assert_eq!(second, PickRequest::Busy);
        assert_eq!(scene.engine().pick_passes_started(), passes + 1);

        let resolution = scene.engine_mut().finish_pick().expect("pick discarded");
        assert_eq!(resolution.target, target(1, 0));
        assert!(!scene.engine().is_pick_in_flight());
        recorded.take_clicks();
    }

    // --- Pointer leaving the viewport does not cancel an in-flight click ---
    {
        assert_eq!(hover(&mut scene, project(0.0, 3.0)), target(0, 2));
        recorded.take_hovers();

        scene.pointer_clicked(CENTER.0, CENTER.1);
        assert!(scene.engine().is_pick_in_flight());
        scene.pointer_left();
        assert_eq!(recorded.take_hovers(), vec![(0, None)]);

        scene.finish_picks();
        assert_eq!(recorded.take_clicks(), vec![(1, 0)]);
        assert_eq!(scene.engine().hovered(), None);
    }

    // --- Resize discards the in-flight pick and recreates pick targets ---
    {
        let started = scene.engine_mut().begin_pick(CENTER.0, CENTER.1, PickMode::Click);
        assert!(matches!(started, PickRequest::Started(_)));
        scene.resize(WIDTH * 2, HEIGHT * 2);
        assert_eq!(scene.engine().pick_target_size(), Some((WIDTH * 2, HEIGHT * 2)));
        assert_eq!(scene.engine_mut().finish_pick(), None);
        assert!(recorded.take_clicks().is_empty());

        scene
            .render(&collections, &camera(), (WIDTH * 2, HEIGHT * 2))
            .expect("render failed");
        assert_eq!(click(&mut scene, (CENTER.0 * 2.0, CENTER.1 * 2.0)), target(1, 0));
        recorded.take_clicks();

        scene
            .render(&collections, &camera(), (WIDTH, HEIGHT))
            .expect("render failed");
    }

    // --- Removing the hovered collection reports the hover as left ---
    {
        assert_eq!(hover(&mut scene, CENTER), target(1, 0));
        assert_eq!(recorded.take_hovers(), vec![(1, Some(0))]);

        let points_only = vec![collections[0].clone()];
        scene
            .render(&points_only, &camera(), (WIDTH, HEIGHT))
            .expect("render failed");
        assert_eq!(recorded.take_hovers(), vec![(1, None)]);
        assert_eq!(scene.engine().hovered(), None);

        scene
            .render(&collections, &camera(), (WIDTH, HEIGHT))
            .expect("render failed");
        assert!(recorded.take_hovers().is_empty());
    }

    // --- Identical input neither grows buffers nor changes IDs ---
    {
        let capacity = scene.engine().buffer_capacity();
        let reallocations = scene.engine().buffer_reallocations();
        let mapping = scene.engine().id_mapping().clone();
        let compilations = scene.engine().pipeline_compilations();

        for _ in 0..3 {
            scene
                .render(&collections, &camera(), (WIDTH, HEIGHT))
                .expect("render failed");
        }
        let rebuilt = sample_scene(&recorded);
        scene
            .render(&rebuilt, &camera(), (WIDTH, HEIGHT))
            .expect("render failed");

        assert_eq!(scene.engine().buffer_capacity(), capacity);
        assert_eq!(scene.engine().buffer_reallocations(), reallocations);
        assert_eq!(scene.engine().id_mapping(), &mapping);
        assert_eq!(scene.engine().pipeline_compilations(), compilations);
    }

    // --- Empty and malformed collections take no IDs ---
    {
        let empty = PointCloud::new(Vec::new());
        let ragged = PointCloud::new(vec![0.0; 4]);
        let boxes = Cuboid::from_centers(&[Vec3::ZERO, Vec3::new(0.0, 0.0, -3.0)])
            .with_size([1.0, 1.0, 1.0]);
        let collections: Vec<PrimitiveCollection> = vec![empty.into(), ragged.into(), boxes.into()];
        scene
            .render(&collections, &camera(), (WIDTH, HEIGHT))
            .expect("render failed");

        assert_eq!(scene.engine().render_objects().len(), 1);
        assert_eq!(scene.engine().id_mapping().base_id(2), Some(1));
        assert_eq!(click(&mut scene, CENTER), target(2, 0));
    }

    // --- Teardown is idempotent ---
    {
        scene.destroy();
        scene.destroy();
        assert!(scene.engine().is_destroyed());
        assert_eq!(click(&mut scene, CENTER), None);
    }
}

#[test]
fn headless_render_tests() {
    let background = match render_to_image(&[], &camera(), WIDTH, HEIGHT) {
        Ok(pixels) => pixels,
        Err(e) => {
            eprintln!("Skipping headless tests: no GPU adapter available ({e})");
            return;
        }
    };
    assert_eq!(background.len(), (WIDTH * HEIGHT * 4) as usize);
    let first = &background[0..4];
    assert!(
        background.chunks(4).all(|px| px == first),
        "empty scene should be uniform background color"
    );

    let ellipsoids = Ellipsoid::from_centers(&[Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)])
        .with_radius([1.0, 0.5, 0.5])
        .with_alpha(0.8);
    let collections = vec![
        PrimitiveCollection::from(ellipsoids.clone()),
        PrimitiveCollection::EllipsoidAxes(ellipsoids),
    ];
    let pixels = render_to_image(&collections, &camera(), WIDTH, HEIGHT).expect("render failed");
    assert_eq!(pixels.len(), (WIDTH * HEIGHT * 4) as usize);
    assert!(
        pixels.chunks(4).any(|px| px != first),
        "ellipsoids should cover part of the frame"
    );
}

#[test]
fn json_descriptors_render() {
    let json = r#"[
        {"type": "PointCloud", "positions": [0, 0, 0, 1, 0, 0], "size": 0.5},
        {"type": "LineBeams", "points": [0, 0, 0]},
        {"type": "Cuboid", "centers": [0, 0, -3], "size": [1, 1, 1]}
    ]"#;
    let collections = PrimitiveCollection::list_from_json_str(json).unwrap();
    assert_eq!(collections.len(), 3);
    assert_eq!(collections[1].kind(), None);

    let Some(mut scene) = headless_scene() else {
        return;
    };
    scene
        .render(&collections, &camera(), (WIDTH, HEIGHT))
        .expect("render failed");
    let mapping = scene.engine().id_mapping();
    assert_eq!(mapping.base_id(0), Some(1));
    assert_eq!(mapping.base_id(1), None);
    assert_eq!(mapping.base_id(2), Some(3));
    assert_eq!(scene.engine().render_objects().len(), 2);
}

fn center_pixel(pixels: &[u8]) -> [u8; 4] {
    let offset = ((HEIGHT / 2 * WIDTH + WIDTH / 2) * 4) as usize;
    [
        pixels[offset],
        pixels[offset + 1],
        pixels[offset + 2],
        pixels[offset + 3],
    ]
}

#[test]
fn translucent_instances_blend_over_opaque() {
    // Listed first and nearer to the camera than the opaque ellipsoid
    let glass = Ellipsoid::from_centers(&[Vec3::ZERO])
        .with_radius([1.0, 1.0, 1.0])
        .with_colors(vec![1.0, 1.0, 0.0])
        .with_alpha(0.5);
    let solid = Ellipsoid::from_centers(&[Vec3::new(0.0, 3.0, 0.0)])
        .with_radius([2.0, 2.0, 2.0])
        .with_colors(vec![0.1, 0.2, 0.9]);

    let alone = match render_to_image(&[glass.clone().into()], &camera(), WIDTH, HEIGHT) {
        Ok(pixels) => center_pixel(&pixels),
        Err(e) => {
            eprintln!("Skipping headless tests: no GPU adapter available ({e})");
            return;
        }
    };
    let both = render_to_image(&[glass.into(), solid.into()], &camera(), WIDTH, HEIGHT)
        .expect("render failed");
    let both = center_pixel(&both);

    // Over white the red channel stays high; over blue it must drop
    assert!(
        u16::from(both[0]) + 30 < u16::from(alone[0]),
        "opaque ellipsoid should show through: alone {alone:?}, over blue {both:?}"
    );
}

#[test]
fn point_pick_matches_drawn_disc() {
    let Some(mut scene) = headless_scene() else {
        return;
    };
    let point = PointCloud::from_points(&[Vec3::ZERO]).with_size(2.0);
    let backdrop = Cuboid::from_centers(&[Vec3::new(0.0, 3.0, 0.0)]).with_size([6.0, 1.0, 6.0]);
    let collections: Vec<PrimitiveCollection> = vec![point.into(), backdrop.into()];
    scene
        .render(&collections, &camera(), (WIDTH, HEIGHT))
        .expect("render failed");

    assert_eq!(click(&mut scene, project(0.0, 0.0)), target(0, 0));
    assert_eq!(click(&mut scene, project(0.5, 0.5)), target(0, 0));
    // Inside the billboard quad but outside the disc
    assert_eq!(click(&mut scene, project(0.9, 0.9)), target(1, 0));
    assert_eq!(click(&mut scene, project(-0.9, -0.9)), target(1, 0));
}
