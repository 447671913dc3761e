// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Simulated scanner backend — virtual devices with scripted feeds.
//
// Each device holds a queue of feeds. A scan pulls the next feed (or the
// device's default feed) and delivers its pages as blank images. Feeds can
// end in a paper jam, devices can refuse to open or fail to report options,
// and every driver call is recorded so callers can check how the hardware
// layer was used.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use scanwerk_core::error::{Result, ScanwerkError};
use scanwerk_core::types::{OptionConstraint, capability};
use tracing::{debug, info};

use crate::traits::{DeviceHandle, DeviceInfo, OptionDescriptor, ScannerBackend};

/// Page size used when a flatbed scan has nothing scripted (US letter at 100 dpi).
const DEFAULT_PAGE: (u32, u32) = (850, 1100);

/// One recorded driver call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Init,
    Shutdown,
    Enumerate,
    Open(String),
    Options(String),
    Configure { device: String, setting: String },
    Page(String),
    Close(String),
}

/// Sheets waiting in the feeder (or on the glass) for one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    /// Page sizes in pixels, in feed order.
    pages: Vec<(u32, u32)>,
    /// Report a paper jam after the listed pages.
    jams: bool,
}

impl Feed {
    pub fn pages(pages: &[(u32, u32)]) -> Self {
        Self {
            pages: pages.to_vec(),
            jams: false,
        }
    }

    /// Deliver `pages`, then fail with a paper jam.
    pub fn jamming(pages: &[(u32, u32)]) -> Self {
        Self {
            pages: pages.to_vec(),
            jams: true,
        }
    }

    pub fn empty() -> Self {
        Self::pages(&[])
    }
}

/// A virtual scanning device.
#[derive(Debug)]
pub struct SimulatedDevice {
    info: DeviceInfo,
    options: Vec<OptionDescriptor>,
    feeds: Mutex<VecDeque<Feed>>,
    default_feed: Option<Feed>,
    unavailable: bool,
    broken_options: bool,
}

impl SimulatedDevice {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            info: DeviceInfo {
                id: id.into(),
                vendor: "Scanwerk".into(),
                model: "Virtual Scanner".into(),
                type_info: "virtual device".into(),
            },
            options: default_options(),
            feeds: Mutex::new(VecDeque::new()),
            default_feed: None,
            unavailable: false,
            broken_options: false,
        }
    }

    pub fn with_model(mut self, vendor: &str, model: &str) -> Self {
        self.info.vendor = vendor.into();
        self.info.model = model.into();
        self
    }

    /// Queue a feed for the next scan.
    pub fn with_feed(self, feed: Feed) -> Self {
        self.feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(feed);
        self
    }

    /// Feed used whenever the queue is empty.
    pub fn with_default_feed(mut self, feed: Feed) -> Self {
        self.default_feed = Some(feed);
        self
    }

    /// Listed by enumeration but fails to open.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Opens, but reading its options fails.
    pub fn with_broken_options(mut self) -> Self {
        self.broken_options = true;
        self
    }

    /// Queue a feed on a device that is already part of a backend.
    pub fn load(&self, feed: Feed) {
        self.feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(feed);
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    fn next_feed(&self) -> Feed {
        self.feeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .or_else(|| self.default_feed.clone())
            .unwrap_or_else(Feed::empty)
    }

    fn accepts(&self, option_name: &str, value: &str) -> bool {
        self.options
            .iter()
            .find(|option| option.name.as_deref() == Some(option_name))
            .and_then(|option| match &option.constraint {
                Some(OptionConstraint::StringList { values }) => {
                    Some(values.iter().any(|v| v == value))
                }
                _ => None,
            })
            .unwrap_or(true)
    }
}

/// Backend driving a fixed set of [`SimulatedDevice`]s.
#[derive(Debug)]
pub struct SimulatedBackend {
    devices: Vec<SimulatedDevice>,
    calls: Mutex<Vec<DriverCall>>,
    active_sessions: AtomicUsize,
    max_sessions: AtomicUsize,
    enumeration_hold: Mutex<Option<Receiver<()>>>,
    page_delay: Duration,
}

impl SimulatedBackend {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            devices,
            calls: Mutex::new(Vec::new()),
            active_sessions: AtomicUsize::new(0),
            max_sessions: AtomicUsize::new(0),
            enumeration_hold: Mutex::new(None),
            page_delay: Duration::ZERO,
        }
    }

    /// A single virtual scanner whose feeder always holds two letter pages.
    pub fn demo() -> Self {
        Self::new(vec![
            SimulatedDevice::new("sim:virtual-scanner")
                .with_default_feed(Feed::pages(&[DEFAULT_PAGE, DEFAULT_PAGE])),
        ])
    }

    /// Block the next enumeration until `release` receives a message (or
    /// its sender is dropped).
    pub fn with_enumeration_hold(self, release: Receiver<()>) -> Self {
        *self
            .enumeration_hold
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(release);
        self
    }

    /// Sleep this long for every delivered page.
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn device(&self, id: &str) -> Option<&SimulatedDevice> {
        self.devices.iter().find(|device| device.info.id == id)
    }

    /// Every driver call so far, in order.
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn hardware_touched(&self) -> bool {
        !self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Highest number of driver sessions that were open at the same time.
    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_sessions.load(Ordering::SeqCst)
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    fn record(&self, call: DriverCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn in_session(&self) -> bool {
        self.active_sessions.load(Ordering::SeqCst) > 0
    }
}

impl ScannerBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn init(&self) -> Result<()> {
        self.record(DriverCall::Init);
        let open = self.active_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_sessions.fetch_max(open, Ordering::SeqCst);
        debug!(open, "simulated driver initialised");
        Ok(())
    }

    fn shutdown(&self) {
        self.record(DriverCall::Shutdown);
        let _ = self
            .active_sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        debug!("simulated driver shut down");
    }

    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.record(DriverCall::Enumerate);
        if !self.in_session() {
            return Err(ScanwerkError::Enumeration("driver not initialised".into()));
        }

        let hold = self
            .enumeration_hold
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(release) = hold {
            debug!("enumeration held");
            let _ = release.recv();
        }

        Ok(self.devices.iter().map(|device| device.info.clone()).collect())
    }

    fn open<'a>(&'a self, device_id: &str) -> Result<Box<dyn DeviceHandle + 'a>> {
        self.record(DriverCall::Open(device_id.to_owned()));
        if !self.in_session() {
            return Err(ScanwerkError::DeviceUnavailable(format!(
                "{device_id}: driver not initialised"
            )));
        }

        let device = self
            .device(device_id)
            .ok_or_else(|| ScanwerkError::DeviceUnavailable(format!("{device_id}: no such device")))?;
        if device.unavailable {
            return Err(ScanwerkError::DeviceUnavailable(format!(
                "{device_id}: device busy or disconnected"
            )));
        }

        info!(device = device_id, "simulated device opened");
        Ok(Box::new(SimulatedHandle {
            backend: self,
            device,
            resolution: 300,
            mode: "Gray".into(),
        }))
    }
}

struct SimulatedHandle<'a> {
    backend: &'a SimulatedBackend,
    device: &'a SimulatedDevice,
    resolution: u32,
    mode: String,
}

impl SimulatedHandle<'_> {
    fn configure(&self, setting: String) {
        self.backend.record(DriverCall::Configure {
            device: self.device.info.id.clone(),
            setting,
        });
    }
}

impl DeviceHandle for SimulatedHandle<'_> {
    fn options(&self) -> Result<Vec<OptionDescriptor>> {
        self.backend
            .record(DriverCall::Options(self.device.info.id.clone()));
        if self.device.broken_options {
            return Err(ScanwerkError::Enumeration(format!(
                "{}: option descriptors unreadable",
                self.device.info.id
            )));
        }
        Ok(self.device.options.clone())
    }

    fn set_source(&mut self, source: &str) -> Result<()> {
        self.configure(format!("source={source}"));
        if !self.device.accepts("source", source) {
            return Err(ScanwerkError::ScanFailed(format!("invalid source {source:?}")));
        }
        Ok(())
    }

    fn set_resolution(&mut self, dpi: u32) -> Result<()> {
        self.configure(format!("resolution={dpi}"));
        if dpi == 0 {
            return Err(ScanwerkError::ScanFailed("invalid resolution 0".into()));
        }
        self.resolution = dpi;
        Ok(())
    }

    fn set_mode(&mut self, mode: &str) -> Result<()> {
        self.configure(format!("mode={mode}"));
        if !self.device.accepts("mode", mode) {
            return Err(ScanwerkError::ScanFailed(format!("invalid mode {mode:?}")));
        }
        self.mode = mode.to_owned();
        Ok(())
    }

    fn scan_one(&mut self) -> Result<DynamicImage> {
        let feed = self.device.next_feed();
        match feed.pages.first() {
            Some(&(width, height)) => {
                Ok(deliver(self.backend, &self.device.info.id, &self.mode, width, height))
            }
            None if feed.jams => Err(ScanwerkError::ScanFailed("paper jam".into())),
            None => Ok(deliver(
                self.backend,
                &self.device.info.id,
                &self.mode,
                DEFAULT_PAGE.0,
                DEFAULT_PAGE.1,
            )),
        }
    }

    fn scan_sequence<'s>(&'s mut self) -> Box<dyn Iterator<Item = Result<DynamicImage>> + 's> {
        let feed = self.device.next_feed();
        Box::new(FeedIter {
            backend: self.backend,
            device_id: &self.device.info.id,
            mode: &self.mode,
            pages: feed.pages.into_iter(),
            jams: feed.jams,
            finished: false,
        })
    }
}

impl Drop for SimulatedHandle<'_> {
    fn drop(&mut self) {
        self.backend
            .record(DriverCall::Close(self.device.info.id.clone()));
    }
}

struct FeedIter<'s> {
    backend: &'s SimulatedBackend,
    device_id: &'s str,
    mode: &'s str,
    pages: std::vec::IntoIter<(u32, u32)>,
    jams: bool,
    finished: bool,
}

impl Iterator for FeedIter<'_> {
    type Item = Result<DynamicImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.pages.next() {
            Some((width, height)) => Some(Ok(deliver(
                self.backend,
                self.device_id,
                self.mode,
                width,
                height,
            ))),
            None => {
                self.finished = true;
                self.jams.then(|| {
                    Err(ScanwerkError::ScanFailed(
                        "paper jam in document feeder".into(),
                    ))
                })
            }
        }
    }
}

fn deliver(
    backend: &SimulatedBackend,
    device_id: &str,
    mode: &str,
    width: u32,
    height: u32,
) -> DynamicImage {
    backend.record(DriverCall::Page(device_id.to_owned()));
    if !backend.page_delay.is_zero() {
        std::thread::sleep(backend.page_delay);
    }
    if mode.eq_ignore_ascii_case("color") {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])))
    } else {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255])))
    }
}

fn default_options() -> Vec<OptionDescriptor> {
    let settable = capability::SOFT_SELECT | capability::SOFT_DETECT;
    vec![
        OptionDescriptor {
            index: 1,
            name: None,
            title: "Scan Mode".into(),
            description: None,
            type_code: 5,
            unit_code: 0,
            size: 0,
            capabilities: 0,
            constraint: None,
        },
        OptionDescriptor {
            index: 2,
            name: Some("mode".into()),
            title: "Scan mode".into(),
            description: Some("Selects the scan mode (e.g., lineart, monochrome, or color).".into()),
            type_code: 3,
            unit_code: 0,
            size: 32,
            capabilities: settable,
            constraint: Some(OptionConstraint::StringList {
                values: vec!["Lineart".into(), "Gray".into(), "Color".into()],
            }),
        },
        OptionDescriptor {
            index: 3,
            name: Some("resolution".into()),
            title: "Scan resolution".into(),
            description: Some("Sets the resolution of the scanned image.".into()),
            type_code: 1,
            unit_code: 4,
            size: 4,
            capabilities: settable,
            constraint: Some(OptionConstraint::IntList {
                values: vec![75, 150, 300, 600],
            }),
        },
        OptionDescriptor {
            index: 4,
            name: Some("source".into()),
            title: "Scan source".into(),
            description: Some("Selects the scan source (such as a document-feeder).".into()),
            type_code: 3,
            unit_code: 0,
            size: 32,
            capabilities: settable,
            constraint: Some(OptionConstraint::StringList {
                values: vec!["Flatbed".into(), "ADF".into()],
            }),
        },
        OptionDescriptor {
            index: 5,
            name: Some("brightness".into()),
            title: "Brightness".into(),
            description: Some("Controls the brightness of the acquired image.".into()),
            type_code: 2,
            unit_code: 5,
            size: 4,
            capabilities: settable | capability::ADVANCED,
            constraint: Some(OptionConstraint::Range {
                min: -100.0,
                max: 100.0,
                step: 1.0,
            }),
        },
        OptionDescriptor {
            index: 6,
            name: Some("preview".into()),
            title: "Preview".into(),
            description: Some("Request a preview-quality scan.".into()),
            type_code: 0,
            unit_code: 0,
            size: 4,
            capabilities: settable,
            constraint: None,
        },
    ]
}
