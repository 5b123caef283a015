//! Opens a window and drives the present loop with the wgpu backend.
//!
//! `MVR_PRESENT_MODE` (vsync, triple-buffer, immediate), `MVR_BUFFERS` and
//! `MVR_DEBUG=1` tune the session.

use std::sync::Arc;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use mvr_render::backend::{Extent, WindowDescriptor};
use mvr_render::backend::wgpu::{self as wgpu_backend, GpuInit, WgpuRuntime, WinitWindowSystem};
use mvr_render::logging::{LoggingConfig, init_logging};
use mvr_render::{InitializeParams, PresentMode, RenderError, Renderer};

const WINDOW_TITLE: &str = "Test App";
const WINDOW_WIDTH: f64 = 800.0;
const WINDOW_HEIGHT: f64 = 600.0;
const REPORT_EVERY: u64 = 600;

/// Session settings read from the environment.
#[derive(Debug, Clone)]
struct Settings {
    present_mode: PresentMode,
    buffer_count_hint: u32,
    debug: bool,
}

impl Settings {
    fn from_env() -> Result<Self> {
        let present_mode = match std::env::var("MVR_PRESENT_MODE") {
            Ok(s) => s.parse::<PresentMode>().context("invalid MVR_PRESENT_MODE")?,
            Err(_) => PresentMode::default(),
        };
        let buffer_count_hint = match std::env::var("MVR_BUFFERS") {
            Ok(s) => s.trim().parse::<u32>().context("invalid MVR_BUFFERS")?,
            Err(_) => 3,
        };
        let debug = std::env::var("MVR_DEBUG").is_ok_and(|v| v == "1");
        Ok(Self {
            present_mode,
            buffer_count_hint,
            debug,
        })
    }

    fn params(&self, window: WindowDescriptor) -> InitializeParams {
        InitializeParams::new(window)
            .with_present_mode(self.present_mode)
            .with_buffer_count_hint(self.buffer_count_hint)
            .with_debug(self.debug)
            .with_application_name(WINDOW_TITLE)
    }
}

struct App {
    settings: Settings,
    renderer: Renderer<WinitWindowSystem, WgpuRuntime>,
    window: Option<(Arc<Window>, WindowDescriptor)>,
    frames: u64,
    exit_requested: bool,
}

impl App {
    fn new(settings: Settings) -> Self {
        let (window_system, runtime) = wgpu_backend::backend(GpuInit::default());
        Self {
            settings,
            renderer: Renderer::new(window_system, runtime),
            window: None,
            frames: 0,
            exit_requested: false,
        }
    }

    fn open_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        log::info!("creating window");
        let attrs = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );

        let descriptor = self
            .renderer
            .window_system_mut()
            .register_window(window.clone())
            .context("window registration failed")?;
        self.window = Some((window, descriptor.clone()));

        self.renderer
            .initialize(self.settings.params(descriptor))
            .context("renderer initialization failed")?;
        log::info!(
            "presenting with {:?} on {:?}",
            self.renderer.present_mode(),
            self.renderer.selected_device().map(|d| d.name.as_str())
        );
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let Some((window, descriptor)) = self.window.clone() else {
            return Ok(());
        };
        self.renderer.poll_events();

        match self.frame(&window) {
            Ok(()) => {
                self.frames += 1;
                if self.frames % REPORT_EVERY == 0 {
                    log::info!(
                        "{} frames, {} buffer(s) in flight",
                        self.frames,
                        self.renderer.in_flight()
                    );
                }
                Ok(())
            }
            Err(err) if err.is_critical() => {
                log::warn!("restarting renderer after: {err}");
                self.renderer.shutdown();
                self.renderer
                    .initialize(self.settings.params(descriptor))
                    .context("renderer re-initialization failed")
            }
            Err(RenderError::Graphics(_)) => {
                // Stale surface; a zero-sized (minimized) window keeps failing
                // until it is restored.
                if let Err(err) = self
                    .renderer
                    .reconfigure(self.settings.present_mode, self.settings.buffer_count_hint)
                {
                    log::debug!("reconfigure deferred: {err}");
                }
                Ok(())
            }
            Err(err) => Err(err).context("frame failed"),
        }
    }

    fn frame(&mut self, window: &Window) -> Result<(), RenderError> {
        let buffer = self.renderer.acquire_next()?;
        window.pre_present_notify();
        self.renderer.present(buffer)
    }

    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.exit_requested = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.open_window(event_loop) {
            log::error!("{e:#}");
            self.request_exit(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some((window, _)) = &self.window {
            window.request_redraw();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("received quit signal");
                self.renderer.shutdown();
                if let Some((_, descriptor)) = self.window.take() {
                    self.renderer
                        .window_system_mut()
                        .unregister_window(descriptor.window);
                }
                self.request_exit(event_loop);
            }
            WindowEvent::Resized(size) => {
                self.renderer
                    .resize_signal()
                    .notify(Extent::from(size));
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    log::error!("{e:#}");
                    self.request_exit(event_loop);
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    let settings = Settings::from_env()?;
    log::info!("settings: {settings:?}");

    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = App::new(settings);
    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;

    log::info!("quit program");
    Ok(())
}
