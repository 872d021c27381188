//! GPU adapter and device acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use volscope_core::PowerPreference;

use crate::error::{RenderError, RenderResult};

/// Device, queue and adapter shared by every renderer and resource.
///
/// When the device is lost, [`GpuContext::is_lost`] turns true and every
/// texture, buffer and bind group created from it must be rebuilt by the caller.
pub struct GpuContext {
    /// The wgpu instance.
    pub instance: wgpu::Instance,
    /// The selected adapter.
    pub adapter: wgpu::Adapter,
    /// The wgpu device.
    pub device: wgpu::Device,
    /// The wgpu queue.
    pub queue: wgpu::Queue,
    lost: Arc<AtomicBool>,
}

fn to_wgpu_power(power: PowerPreference) -> wgpu::PowerPreference {
    match power {
        PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
        PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
    }
}

impl GpuContext {
    /// Creates a context with no presentation surface.
    pub async fn new_headless(power: PowerPreference) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        Self::from_instance(instance, None, power).await
    }

    /// Creates a context and a surface for `window`.
    pub async fn new_windowed(
        window: Arc<winit::window::Window>,
        power: PowerPreference,
    ) -> RenderResult<(Self, wgpu::Surface<'static>)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;
        let ctx = Self::from_instance(instance, Some(&surface), power).await?;
        Ok((ctx, surface))
    }

    async fn from_instance(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'static>>,
        power: PowerPreference,
    ) -> RenderResult<Self> {
        let options = wgpu::RequestAdapterOptions {
            power_preference: to_wgpu_power(power),
            compatible_surface: surface,
            force_fallback_adapter: false,
        };

        let mut adapter = instance
            .request_adapter(&options)
            .await
            .map_err(|_| RenderError::AdapterCreationFailed)?;

        let (device, queue) = match request_device(&adapter).await {
            Ok(pair) => pair,
            Err(e) => {
                // a fresh adapter sometimes succeeds where a stale one fails
                log::warn!("device request failed ({e}), retrying with a new adapter");
                adapter = instance
                    .request_adapter(&options)
                    .await
                    .map_err(|_| RenderError::AdapterCreationFailed)?;
                request_device(&adapter).await?
            }
        };

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        let lost = Arc::new(AtomicBool::new(false));
        let flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            log::error!("graphics device lost ({reason:?}): {message}");
            flag.store(true, Ordering::SeqCst);
        });

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            lost,
        })
    }

    /// Returns true once the device has been lost.
    #[must_use]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Returns an error if the device has been lost.
    pub fn check_device(&self) -> RenderResult<()> {
        if self.is_lost() {
            return Err(RenderError::DeviceLost(
                "resources must be recreated on a new context".to_string(),
            ));
        }
        Ok(())
    }

    /// Blocks until all submitted work has finished.
    pub fn wait_idle(&self) -> RenderResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|err| {
                log::warn!("device poll failed: {err}");
                RenderError::from(err)
            })
    }
}

async fn request_device(
    adapter: &wgpu::Adapter,
) -> Result<(wgpu::Device, wgpu::Queue), wgpu::RequestDeviceError> {
    adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("volscope device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        })
        .await
}
