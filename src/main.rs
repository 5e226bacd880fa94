mod console;
mod hud;

use anyhow::{Context, Result};
use gyro_config::AppConfig;
use gyro_renderer::camera::Camera;
use gyro_renderer::orientation::{AngularVelocity, AxisMapping, FrameClock, OrientationIntegrator};
use gyro_renderer::pipeline::{GpuWireMesh, Uniforms, WireframePipeline};
use gyro_renderer::scene::SceneSolid;
use gyro_renderer::wireframe;
use gyro_stream::{DisplayCommand, DisplayCommander, EventNames, Line, Screen, StreamClient};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

/// Application state.
struct App {
    config: AppConfig,
    /// False when the config file failed to load; it is then never written.
    config_loaded: bool,
    client: StreamClient,
    commander: DisplayCommander,
    integrator: OrientationIntegrator,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    frame_clock: FrameClock,
    title: hud::TitleThrottle,
}

struct GpuState {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    pipeline: WireframePipeline,
    mesh: GpuWireMesh,
    solid: SceneSolid,
    camera: Camera,
    frame_count: u64,
}

impl App {
    fn new(
        config: AppConfig,
        config_loaded: bool,
        client: StreamClient,
        mapping: AxisMapping,
    ) -> Self {
        let commander = client.commander();
        Self {
            config,
            config_loaded,
            client,
            commander,
            integrator: OrientationIntegrator::new(mapping),
            window: None,
            gpu: None,
            frame_clock: FrameClock::default(),
            title: hud::TitleThrottle::default(),
        }
    }

    /// Enter shortcut: send the configured default text.
    fn send_default_text(&self) {
        let display = &self.config.display;
        let target = Screen::try_from(display.default_screen)
            .and_then(|screen| Ok((screen, Line::try_from(display.default_line)?)));
        match target {
            Ok((screen, line)) => {
                let command = DisplayCommand::new(screen, line, &display.default_text);
                if !self.commander.update_display(command) {
                    warn!("Not connected, display update not sent");
                }
            }
            Err(e) => error!(error = %e, "Invalid default display target in config"),
        }
    }

    fn render_frame(&mut self) {
        let Some(gpu) = &mut self.gpu else {
            return;
        };

        let now = Instant::now();
        let delta = self.frame_clock.tick(now);

        // Integrate the latest angular velocity, stale or not.
        let snapshot = self.client.snapshot();
        let velocity = AngularVelocity::new(snapshot.gx, snapshot.gy, snapshot.gz);
        let orientation = self.integrator.advance(velocity, delta);
        gpu.solid.set_orientation(orientation);

        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(e) => {
                warn!(?e, "Failed to get surface texture");
                gpu.surface.configure(&gpu.device, &gpu.surface_config);
                return;
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let uniforms = Uniforms::new(
            gpu.solid.model_matrix(),
            gpu.camera.view_projection(),
            gpu.solid.color,
        );
        gpu.pipeline.write_uniforms(&gpu.queue, &uniforms);

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });
        gpu.pipeline.draw(&mut encoder, &view, &gpu.mesh);
        gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        gpu.frame_count += 1;
        if gpu.frame_count % 600 == 0 {
            debug!(
                frames = gpu.frame_count,
                x = orientation.x,
                y = orientation.y,
                z = orientation.z,
                "Render heartbeat"
            );
        }

        if let Some(window) = &self.window {
            let text = hud::title(self.client.status(), &snapshot);
            if let Some(text) = self.title.update(now, text) {
                window.set_title(&text);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes()
            .with_title("Gyro Dashboard")
            .with_inner_size(PhysicalSize::new(1280, 800));

        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!(?e, "Failed to create window");
                event_loop.exit();
                return;
            }
        };

        match init_gpu(window.clone(), &self.config) {
            Ok(gpu) => {
                self.gpu = Some(gpu);
                self.window = Some(window.clone());
                window.request_redraw();
                info!("Renderer initialized");
            }
            Err(e) => {
                error!(?e, "Failed to initialize renderer");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                if !self.config_loaded {
                    warn!("Config failed to load, leaving the file as is");
                } else if let Err(e) = gyro_config::save_config(&self.config) {
                    error!(?e, "Failed to save config");
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                if size.width > 0 && size.height > 0 {
                    if let Some(gpu) = &mut self.gpu {
                        gpu.surface_config.width = size.width;
                        gpu.surface_config.height = size.height;
                        gpu.surface.configure(&gpu.device, &gpu.surface_config);
                        gpu.camera.resize(size.width, size.height);
                    }
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == winit::event::ElementState::Pressed && !event.repeat {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Enter) => self.send_default_text(),
                        PhysicalKey::Code(KeyCode::Delete) => {
                            if !self.commander.clear_displays() {
                                warn!("Not connected, clear not sent");
                            }
                        }
                        PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                        _ => {}
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                self.render_frame();

                // Request next frame.
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            _ => {}
        }
    }
}

fn init_gpu(window: Arc<Window>, config: &AppConfig) -> Result<GpuState> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .context("Failed to create surface")?;

    let (device, queue, adapter) = pollster::block_on(async {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter found")?;

        info!(name = adapter.get_info().name, "Using GPU");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gyro_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .context("Failed to create device")?;

        Ok::<_, anyhow::Error>((device, queue, adapter))
    })?;

    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(&adapter);
    let format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .or_else(|| surface_caps.formats.first().copied())
        .context("Surface reports no formats")?;

    let surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: wgpu::PresentMode::AutoVsync,
        alpha_mode: wgpu::CompositeAlphaMode::Auto,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &surface_config);

    let renderer = &config.renderer;
    let color = wireframe::parse_color(&renderer.line_color).unwrap_or_else(|e| {
        warn!(error = %e, "Using default line colour");
        [0.016, 0.651, 0.846, 1.0]
    });
    let solid = SceneSolid::cube(renderer.cube_half_extent, color);
    let mesh = GpuWireMesh::upload(&device, &solid.mesh);
    let pipeline = WireframePipeline::new(&device, format);

    let mut camera = Camera::new(renderer.fov_y_degrees);
    camera.resize(surface_config.width, surface_config.height);

    Ok(GpuState {
        device,
        queue,
        surface,
        surface_config,
        pipeline,
        mesh,
        solid,
        camera,
        frame_count: 0,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gyro_dashboard=info,gyro_stream=info,gyro_renderer=info".into()
            }),
        )
        .init();

    info!("Gyro Dashboard starting");

    // Load config.
    let (config, config_loaded) = match gyro_config::load_config() {
        Ok(config) => (config, true),
        Err(e) => {
            warn!(?e, "Failed to load config, using defaults");
            (AppConfig::default(), false)
        }
    };

    let mapping = AxisMapping::from_config(&config.renderer.axis_map).unwrap_or_else(|e| {
        warn!(error = %e, "Invalid axis map, using default");
        AxisMapping::default()
    });
    info!(?mapping, "Axis mapping");

    let endpoint = gyro_config::stream_endpoint(&config.stream);
    let events = EventNames {
        sensor_update: config.stream.sensor_event.clone(),
        update_display: config.stream.update_display_event.clone(),
        clear_displays: config.stream.clear_displays_event.clone(),
    };
    let client = StreamClient::spawn(endpoint.as_deref(), events);

    console::spawn(client.commander())?;
    info!("{}", console::USAGE);

    // Run the application.
    let event_loop = EventLoop::new()?;
    let mut app = App::new(config, config_loaded, client, mapping);
    event_loop.run_app(&mut app)?;

    app.client.close().await;
    info!(ticks = app.integrator.ticks(), "Gyro Dashboard stopped");

    Ok(())
}
