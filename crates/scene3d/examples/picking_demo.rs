//! Interactive picking demo.
//!
//! Hover highlights an instance, clicking logs it. The camera orbits slowly.
//! Run with `RUST_LOG=info cargo run --example picking_demo`.

use std::f32::consts::TAU;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use pollster::FutureExt;
use scene3d::*;
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

type Hovered = Arc<Mutex<Option<(usize, usize)>>>;

fn hooked(collection: usize, primitive: PrimitiveCollection, hovered: &Hovered) -> PrimitiveCollection {
    let hovered = Arc::clone(hovered);
    primitive
        .on_hover(move |instance| {
            let mut current = hovered.lock().unwrap();
            match instance {
                Some(i) => *current = Some((collection, i)),
                None if current.is_some_and(|(c, _)| c == collection) => *current = None,
                None => {}
            }
        })
        .on_click(move |i| log::info!("clicked instance {i} of collection {collection}"))
}

fn build_scene(hovered: &Hovered) -> Vec<PrimitiveCollection> {
    let mut grid = Vec::new();
    let mut colors = Vec::new();
    for i in 0..20 {
        for j in 0..20 {
            let (u, v) = (i as f32 / 19.0, j as f32 / 19.0);
            grid.push(Vec3::new(u * 4.0 - 2.0, v * 4.0 - 2.0, (u * TAU).sin() * 0.3));
            colors.extend_from_slice(&[u, v, 1.0 - u]);
        }
    }
    let points = PointCloud::from_points(&grid)
        .with_colors(colors)
        .with_size(0.08);

    let ellipsoids = Ellipsoid::from_centers(&[Vec3::new(-1.0, 0.0, 1.2), Vec3::new(1.0, 0.0, 1.2)])
        .with_radii(vec![0.5, 0.3, 0.3, 0.3, 0.3, 0.6])
        .with_colors(vec![0.9, 0.4, 0.2, 0.2, 0.7, 0.4])
        .with_alpha(0.85);

    let boxes = Cuboid::from_centers(&[Vec3::new(0.0, 1.5, -1.0), Vec3::new(0.0, -1.5, -1.0)])
        .with_size([0.6, 0.6, 0.6])
        .with_alphas(vec![1.0, 0.5]);

    vec![
        hooked(0, points.into(), hovered),
        hooked(1, ellipsoids.clone().into(), hovered),
        hooked(2, PrimitiveCollection::EllipsoidAxes(ellipsoids), hovered),
        hooked(3, boxes.into(), hovered),
    ]
}

struct Demo {
    window: Option<Arc<Window>>,
    scene: Option<Scene3d>,
    base: Vec<PrimitiveCollection>,
    hovered: Hovered,
    cursor: (f64, f64),
    started: Instant,
}

impl Demo {
    fn new() -> Self {
        let hovered = Hovered::default();
        Self {
            window: None,
            scene: None,
            base: build_scene(&hovered),
            hovered,
            cursor: (0.0, 0.0),
            started: Instant::now(),
        }
    }

    /// Base collections with the hovered instance highlighted.
    fn collections(&self) -> Vec<PrimitiveCollection> {
        let hovered = *self.hovered.lock().unwrap();
        self.base
            .iter()
            .enumerate()
            .map(|(index, collection)| match hovered {
                Some((c, i)) if c == index => collection.clone().with_decoration(
                    Decoration::new([i])
                        .with_color([1.0, 0.85, 0.1])
                        .with_scale(1.3)
                        .with_min_size(0.12),
                ),
                _ => collection.clone(),
            })
            .collect()
    }

    fn camera(&self) -> CameraState {
        let angle = self.started.elapsed().as_secs_f32() * 0.2;
        CameraState::looking_at(Vec3::new(angle.cos() * 7.0, angle.sin() * 7.0, 3.5), Vec3::ZERO)
    }
}

impl ApplicationHandler for Demo {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("scene3d picking demo")
            .with_inner_size(LogicalSize::new(1280, 720));
        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .expect("failed to create window"),
        );
        let scene = Scene3d::windowed(window.clone(), EngineOptions::default())
            .block_on()
            .expect("failed to create scene");

        self.window = Some(window);
        self.scene = Some(scene);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let collections = self.collections();
        let camera = self.camera();
        let (Some(window), Some(scene)) = (&self.window, &mut self.scene) else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                scene.destroy();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => scene.resize(size.width, size.height),
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
                scene.pointer_moved(position.x, position.y);
            }
            WindowEvent::CursorLeft { .. } => scene.pointer_left(),
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => scene.pointer_clicked(self.cursor.0, self.cursor.1),
            WindowEvent::RedrawRequested => {
                scene.tick();
                let size = window.inner_size();
                if let Err(e) = scene.render(&collections, &camera, (size.width, size.height)) {
                    log::error!("{e}");
                }
                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() {
    init_logging();

    let event_loop = EventLoop::new().expect("failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut demo = Demo::new();
    event_loop.run_app(&mut demo).expect("event loop failed");
}
