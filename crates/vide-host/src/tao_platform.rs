//! Real window platform: tao windows hosting wry webviews.
//!
//! Each window gets a webview with the bridge preload script, an IPC
//! handler forwarding page messages into the event loop, a navigation
//! filter and the `visionide` asset protocol. The rendering surface for the
//! window runs on its own task; its updates come back as user events and
//! are evaluated in the page.

use crate::assets::{self, AssetResolver, NavigationGuard};
use crate::config::{HostConfig, WindowConfig};
use crate::controller::{ExitDecision, HostController, PlatformPolicy};
use crate::endpoint::{spawn_endpoint_check, ENDPOINT_CHECK_TIMEOUT};
use crate::ipc::{self, IpcMessage, Routed, SurfaceSink};
use crate::mode::{LoadSource, RunMode};
use crate::platform::{WindowKey, WindowPlatform};
use anyhow::{anyhow, bail, Context};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tao::dpi::LogicalSize;
use tao::event::{Event, StartCause, WindowEvent};
use tao::event_loop::{ControlFlow, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget};
use tao::window::{Window, WindowBuilder, WindowId};
use tracing::{debug, error, info, warn};
use url::Url;
use vide_bridge::{preload_script, BridgeReply, CapabilityBridge, SystemCameraProvider};
use vide_surface::{spawn_surface, RenderingSurface, SurfaceHandle, SurfaceUpdate};
use vide_workers::WorkerEnvironment;
use wry::http::header::CONTENT_TYPE;
use wry::http::Response;
use wry::{PageLoadEvent, WebView, WebViewBuilder};

/// Events delivered to the window thread.
#[derive(Debug)]
pub enum UserEvent {
    /// Message posted by the page
    Ipc { window: WindowKey, body: String },
    /// Output of the window's surface task
    Surface { window: WindowKey, update: SurfaceUpdate },
    PageLoaded { window: WindowKey },
    RetryLoad { window: WindowKey },
    /// Background reachability check of a dev endpoint finished
    EndpointChecked {
        window: WindowKey,
        url: Url,
        result: Result<(), String>,
    },
}

struct HostWindow {
    // Dropped in this order: surface task, webview, window
    surface: Option<SurfaceHandle>,
    webview: Option<WebView>,
    window: Window,
}

impl HostWindow {
    fn evaluate(&self, key: WindowKey, script: &str) {
        let Some(webview) = &self.webview else {
            return;
        };
        if let Err(err) = webview.evaluate_script(script) {
            warn!("Window {}: script failed: {}", key, err);
        }
    }

    fn settle_absent(&self, key: WindowKey, call: u64) {
        match BridgeReply::absent(call).to_script() {
            Ok(script) => self.evaluate(key, &script),
            Err(err) => warn!("Window {}: {}", key, err),
        }
    }

    fn webview(&self, key: WindowKey) -> anyhow::Result<&WebView> {
        self.webview
            .as_ref()
            .ok_or_else(|| anyhow!("Window {} has no webview", key))
    }
}

/// Windows owned by the event loop.
#[derive(Default)]
struct WindowTable {
    windows: HashMap<WindowKey, HostWindow>,
    by_id: HashMap<WindowId, WindowKey>,
    next_key: u64,
}

impl WindowTable {
    fn key_for(&self, id: WindowId) -> Option<WindowKey> {
        self.by_id.get(&id).copied()
    }

    fn get(&self, key: WindowKey) -> anyhow::Result<&HostWindow> {
        self.windows
            .get(&key)
            .ok_or_else(|| anyhow!("Unknown window {}", key))
    }

    /// Route a page message to the bridge or the surface.
    fn dispatch_ipc(&self, key: WindowKey, body: &str) {
        let Some(host) = self.windows.get(&key) else {
            return;
        };
        let message = match IpcMessage::parse(body) {
            Ok(message) => message,
            Err(err) => {
                warn!("Window {}: {}", key, err);
                return;
            }
        };

        let surface = host.surface.as_ref().map(|handle| handle as &dyn SurfaceSink);
        match ipc::route(message, surface) {
            Routed::Forwarded => {}
            Routed::Dropped => debug!("Window {}: surface gone, message dropped", key),
            Routed::SettleAbsent { call, reason } => {
                warn!("Window {}: camera request {} settled absent: {}", key, call, reason);
                host.settle_absent(key, call);
            }
        }
    }

    /// Apply a surface update in the page.
    fn deliver(&self, key: WindowKey, update: &SurfaceUpdate) {
        let Some(host) = self.windows.get(&key) else {
            return;
        };
        match update.to_script() {
            Ok(script) => host.evaluate(key, &script),
            Err(err) => warn!("Window {}: {}", key, err),
        }
    }
}

/// [`WindowPlatform`] over the live event loop, rebuilt for each event.
struct TaoPlatform<'a> {
    target: &'a EventLoopWindowTarget<UserEvent>,
    proxy: &'a EventLoopProxy<UserEvent>,
    table: &'a mut WindowTable,
    env: &'a WorkerEnvironment,
    /// Directory holding the packaged renderer
    asset_root: &'a Path,
    guard: &'a NavigationGuard,
}

impl WindowPlatform for TaoPlatform<'_> {
    fn open_window(&mut self, config: &WindowConfig) -> anyhow::Result<WindowKey> {
        let window = WindowBuilder::new()
            .with_title(&config.title)
            .with_inner_size(LogicalSize::new(config.width, config.height))
            .with_min_inner_size(LogicalSize::new(400.0, 300.0))
            .build(self.target)?;

        self.table.next_key += 1;
        let key = WindowKey(self.table.next_key);
        self.table.by_id.insert(window.id(), key);
        self.table.windows.insert(
            key,
            HostWindow {
                surface: None,
                webview: None,
                window,
            },
        );
        Ok(key)
    }

    fn attach(
        &mut self,
        key: WindowKey,
        bridge: Arc<dyn CapabilityBridge>,
        inspector: bool,
    ) -> anyhow::Result<()> {
        let surface = RenderingSurface::new(bridge, self.env.clone()).with_default_document();
        let sink = self.proxy.clone();
        let handle = spawn_surface(surface, move |update| {
            let _ = sink.send_event(UserEvent::Surface { window: key, update });
        })?;

        let resolver = AssetResolver::new(self.asset_root, handle.snapshot());
        let guard = self.guard.clone();
        let ipc = self.proxy.clone();
        let loads = self.proxy.clone();

        let builder = WebViewBuilder::new()
            .with_initialization_script(&preload_script())
            .with_ipc_handler(move |request| {
                let _ = ipc.send_event(UserEvent::Ipc {
                    window: key,
                    body: request.body().clone(),
                });
            })
            .with_custom_protocol(assets::SCHEME.to_string(), move |_webview_id, request| {
                let asset = resolver.resolve(request.uri().path());
                Response::builder()
                    .status(asset.status)
                    .header(CONTENT_TYPE, asset.mime_type)
                    .body(asset.data)
                    .unwrap_or_else(|_| Response::new(Vec::new().into()))
            })
            .with_navigation_handler(move |url| {
                let allowed = guard.allows(&url);
                if !allowed {
                    warn!("Blocked navigation to {}", url);
                }
                allowed
            })
            .with_on_page_load_handler(move |event, _url| {
                if let PageLoadEvent::Finished = event {
                    let _ = loads.send_event(UserEvent::PageLoaded { window: key });
                }
            })
            .with_devtools(inspector);

        let host = self
            .table
            .windows
            .get_mut(&key)
            .ok_or_else(|| anyhow!("Unknown window {}", key))?;

        #[cfg(any(
            target_os = "windows",
            target_os = "macos",
            target_os = "ios",
            target_os = "android"
        ))]
        let webview = builder
            .build(&host.window)
            .map_err(|err| anyhow!("Failed to create webview: {}", err))?;

        #[cfg(not(any(
            target_os = "windows",
            target_os = "macos",
            target_os = "ios",
            target_os = "android"
        )))]
        let webview = {
            use tao::platform::unix::WindowExtUnix;
            use wry::WebViewBuilderExtUnix;
            let vbox = host
                .window
                .default_vbox()
                .ok_or_else(|| anyhow!("Window {} has no GTK container", key))?;
            let webview = builder
                .build_gtk(vbox)
                .map_err(|err| anyhow!("Failed to create webview: {}", err))?;
            gate_media_permission(&webview, handle.camera_gate());
            webview
        };

        host.webview = Some(webview);
        host.surface = Some(handle);
        debug!("Window {} attached", key);
        Ok(())
    }

    fn load(&mut self, key: WindowKey, source: &LoadSource) -> anyhow::Result<()> {
        let webview = self.table.get(key)?.webview(key)?;
        match source {
            LoadSource::Endpoint(url) => {
                let proxy = self.proxy.clone();
                let checked = url.clone();
                spawn_endpoint_check(url.clone(), ENDPOINT_CHECK_TIMEOUT, move |result| {
                    let _ = proxy.send_event(UserEvent::EndpointChecked {
                        window: key,
                        url: checked,
                        result,
                    });
                })
                .context("Failed to start endpoint check")
            }
            LoadSource::Packaged(_) => {
                if !self.asset_root.is_dir() {
                    bail!("Packaged assets missing at {}", self.asset_root.display());
                }
                webview
                    .load_url(assets::entry_url())
                    .map_err(|err| anyhow!("Failed to load packaged content: {}", err))
            }
        }
    }

    fn show_error_page(&mut self, key: WindowKey, html: &str) -> anyhow::Result<()> {
        self.table
            .get(key)?
            .webview(key)?
            .load_html(html)
            .map_err(|err| anyhow!("{}", err))
    }

    fn open_inspector(&mut self, key: WindowKey) -> anyhow::Result<()> {
        self.table.get(key)?.webview(key)?.open_devtools();
        Ok(())
    }

    fn schedule_retry(&mut self, key: WindowKey, delay: Duration) {
        let proxy = self.proxy.clone();
        let spawned = std::thread::Builder::new()
            .name("load-retry".into())
            .spawn(move || {
                std::thread::sleep(delay);
                let _ = proxy.send_event(UserEvent::RetryLoad { window: key });
            });
        if let Err(err) = spawned {
            error!("Failed to schedule reload of window {}: {}", key, err);
        }
    }

    fn close_window(&mut self, key: WindowKey) {
        if let Some(host) = self.table.windows.remove(&key) {
            self.table.by_id.remove(&host.window.id());
        }
    }
}

/// Let the page's media requests through only while the surface holds a
/// granted camera.
#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "android"
)))]
fn gate_media_permission(webview: &WebView, gate: vide_surface::CameraGate) {
    use webkit2gtk::glib::prelude::*;
    use webkit2gtk::{PermissionRequestExt, SettingsExt, WebViewExt};
    use webkit2gtk::UserMediaPermissionRequest;
    use wry::WebViewExtUnix;

    let inner = webview.webview();
    if let Some(settings) = WebViewExt::settings(&inner) {
        settings.set_enable_media_stream(true);
    }
    inner.connect_permission_request(move |_, request| {
        if request.downcast_ref::<UserMediaPermissionRequest>().is_none() {
            return false;
        }
        if gate.is_open() {
            request.allow();
        } else {
            warn!("Denied media request without a granted camera");
            request.deny();
        }
        true
    });
}

/// Open the endpoint once its check passed, otherwise count a failed load.
fn finish_endpoint_load(
    controller: &mut HostController,
    platform: &mut TaoPlatform<'_>,
    key: WindowKey,
    url: &Url,
    result: Result<(), String>,
) {
    if !controller.session(key).is_some_and(|session| session.is_loading()) {
        debug!("Dropping stale endpoint check for window {}", key);
        return;
    }
    let loaded = result.and_then(|()| {
        let webview = platform.table.get(key).and_then(|host| host.webview(key));
        webview
            .and_then(|webview| {
                webview
                    .load_url(url.as_str())
                    .map_err(|err| anyhow!("Failed to load {}: {}", url, err))
            })
            .map_err(|err| format!("{:#}", err))
    });
    if let Err(reason) = loaded {
        controller.on_load_failed(platform, key, &reason);
    }
}

fn install_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("Cannot locate executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("Executable has no parent directory"))
}

/// Run the host until the last window closes (or forever on platforms that
/// stay resident).
pub fn run(config: HostConfig) -> anyhow::Result<()> {
    let mode = RunMode::from_env(&config)?;
    let policy = PlatformPolicy::from_config(&config);
    let env = WorkerEnvironment::standard().max_respawns(config.max_worker_respawns);

    let install_dir = install_dir()?;
    let source = mode.load_source();
    let asset_root = source
        .resolve(&install_dir)
        .and_then(|entry| entry.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| install_dir.clone());
    let guard = NavigationGuard::new(assets::content_origin(&source));

    info!("Starting in {} mode, content from {}", mode.name(), source);

    let event_loop = EventLoopBuilder::<UserEvent>::with_user_event().build();
    let proxy = event_loop.create_proxy();
    let provider = Arc::new(SystemCameraProvider::new());
    let mut controller = HostController::new(config, mode, policy, provider);
    let mut table = WindowTable::default();

    event_loop.run(move |event, target, control_flow| {
        *control_flow = ControlFlow::Wait;

        let mut platform = TaoPlatform {
            target,
            proxy: &proxy,
            table: &mut table,
            env: &env,
            asset_root: &asset_root,
            guard: &guard,
        };

        match event {
            Event::NewEvents(StartCause::Init) => {
                if let Err(err) = controller.on_ready(&mut platform) {
                    error!("Startup failed: {:#}", err);
                    *control_flow = ControlFlow::Exit;
                }
            }
            Event::Reopen { .. } => {
                if let Err(err) = controller.on_activate(&mut platform) {
                    error!("Failed to reopen window: {:#}", err);
                }
            }
            Event::WindowEvent {
                window_id,
                event: WindowEvent::CloseRequested,
                ..
            } => {
                let Some(key) = platform.table.key_for(window_id) else {
                    return;
                };
                if controller.on_window_closed(&mut platform, key) == Some(ExitDecision::Exit) {
                    *control_flow = ControlFlow::Exit;
                }
            }
            Event::UserEvent(UserEvent::Ipc { window, body }) => {
                platform.table.dispatch_ipc(window, &body);
            }
            Event::UserEvent(UserEvent::Surface { window, update }) => {
                platform.table.deliver(window, &update);
            }
            Event::UserEvent(UserEvent::PageLoaded { window }) => {
                controller.on_load_finished(window);
            }
            Event::UserEvent(UserEvent::RetryLoad { window }) => {
                if let Err(err) = controller.retry_load(&mut platform, window) {
                    warn!("Reload of window {} failed: {}", window, err);
                }
            }
            Event::UserEvent(UserEvent::EndpointChecked {
                window,
                url,
                result,
            }) => {
                finish_endpoint_load(&mut controller, &mut platform, window, &url, result);
            }
            _ => {}
        }
    })
}
