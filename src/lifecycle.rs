//! Entry, run loop and handover to the application.
//!
//! ```text
//! Idle --enter()--> Active --step()--> ExitPending --linger()---> Handover
//!   |                  |                                              ^
//!   +------------------+-------------------- step() / enter() --------+
//! ```

use log::info;
use usb_device::bus::UsbBus;
use usb_device::device::UsbDevice;

use crate::class::AspLoaderClass;
use crate::mem::IspMemIO;

/// If and how the loader leaves without a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Stay resident until the next reset.
    Never,
    /// Leave once the entry condition has been false for `threshold`
    /// consecutive polls while no host session is open.
    Hysteresis {
        /// Consecutive false polls needed.
        threshold: u8,
    },
    /// Like [`ExitPolicy::Hysteresis`], and additionally leave shortly after
    /// the host disconnects at the end of an upload.
    AfterUpload {
        /// Consecutive false polls needed.
        threshold: u8,
    },
}

impl ExitPolicy {
    /// `true` unless the policy is [`ExitPolicy::Never`].
    pub const fn can_exit(self) -> bool {
        !matches!(self, ExitPolicy::Never)
    }

    /// Consecutive false polls needed to leave, `0` for
    /// [`ExitPolicy::Never`].
    pub const fn threshold(self) -> u8 {
        match self {
            ExitPolicy::Never => 0,
            ExitPolicy::Hysteresis { threshold } | ExitPolicy::AfterUpload { threshold } => {
                threshold
            }
        }
    }
}

/// Lifecycle states of the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// Not started yet.
    Idle,
    /// Serving the host.
    Active,
    /// The host asked us to leave; waiting for it to see the reply.
    ExitPending,
    /// Leaving for the application. Terminal.
    Handover,
}

/// Counter deciding when a loader that can exit actually leaves.
///
/// Each poll with the entry condition false counts toward the threshold, a
/// poll with the condition true starts over. While a host is talking to the
/// loader (any request that is not part of an upload, including connect)
/// the loader stays regardless, until the host disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitHysteresis {
    policy: ExitPolicy,
    released: u8,
    host_attached: bool,
    exit_requested: bool,
}

impl ExitHysteresis {
    /// Fresh counter for `policy`.
    pub const fn new(policy: ExitPolicy) -> Self {
        Self {
            policy,
            released: 0,
            host_attached: false,
            exit_requested: false,
        }
    }

    /// The policy this counter enforces.
    pub fn policy(&self) -> ExitPolicy {
        self.policy
    }

    /// Consecutive polls with the entry condition false so far.
    pub fn released(&self) -> u8 {
        self.released
    }

    /// `true` while a host session holds the loader.
    pub fn host_attached(&self) -> bool {
        self.host_attached
    }

    /// `true` once a disconnect asked the loader to leave.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// A request arrived that means a host is working with us.
    pub fn host_activity(&mut self) {
        if self.policy.can_exit() {
            self.host_attached = true;
        }
    }

    /// The host ended its session.
    pub fn disconnect(&mut self) {
        self.host_attached = false;
        if let ExitPolicy::AfterUpload { .. } = self.policy {
            self.exit_requested = true;
        }
    }

    /// Feed one evaluation of the entry condition and get the next state.
    pub fn poll(&mut self, resident: bool) -> LoaderState {
        if !self.policy.can_exit() {
            return LoaderState::Active;
        }
        if self.exit_requested {
            return LoaderState::ExitPending;
        }

        if resident {
            self.released = 0;
        } else {
            self.released = self.released.saturating_add(1);
        }

        if self.released >= self.policy.threshold() && !self.host_attached {
            LoaderState::Handover
        } else {
            LoaderState::Active
        }
    }
}

/// External condition deciding whether the loader runs at all, e.g. a
/// jumper or a button.
pub trait EntryCondition {
    /// `true` to stay in (or enter) the loader.
    fn should_remain_resident(&mut self) -> bool;
}

impl<F: FnMut() -> bool> EntryCondition for F {
    fn should_remain_resident(&mut self) -> bool {
        self()
    }
}

/// Interrupt vector placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorTable {
    /// Vectors at the start of flash.
    Application,
    /// Vectors in the loader section.
    Loader,
}

/// Board and core services the lifecycle needs.
pub trait LoaderPlatform {
    /// How long USB stays detached at startup so the host re-enumerates.
    /// Default is `260` ms.
    const REENUMERATE_DELAY_MS: u32 = 260;

    /// How long the loader lingers after a disconnect requested exit before
    /// detaching, so the host collects its reply. [`Loader::run`] keeps
    /// polling USB meanwhile. Default is `500` ms.
    const EXIT_DELAY_MS: u32 = 500;

    /// Board bring-up done first thing on every boot, e.g. the entry jumper
    /// pull-up. Default does nothing.
    fn init(&mut self) {}

    /// Restart the watchdog period. Default does nothing.
    fn feed_watchdog(&mut self) {}

    /// `true` if the last reset came from the reset pin. Other resets
    /// (power-on, watchdog, brown-out) go straight to the application.
    /// Default is `true`.
    fn external_reset(&mut self) -> bool {
        true
    }

    /// Clear the reset cause flags for the next boot.
    fn clear_reset_flags(&mut self) {}

    /// Turn off a watchdog the application may have left running.
    fn disable_watchdog(&mut self) {}

    /// Move the interrupt vectors.
    fn select_vectors(&mut self, table: VectorTable);

    /// Globally enable interrupts.
    fn enable_interrupts(&mut self);

    /// Globally disable interrupts.
    fn disable_interrupts(&mut self);

    /// Connect the USB pull-up.
    fn usb_attach(&mut self);

    /// Disconnect the USB pull-up.
    fn usb_detach(&mut self);

    /// Mask and unconfigure the USB interrupt sources.
    fn disable_usb_interrupts(&mut self);

    /// Busy-wait.
    fn delay_ms(&mut self, ms: u32);

    /// Board-specific cleanup before leaving. Default does nothing.
    fn exit_hook(&mut self) {}

    /// Reset entry of the application.
    fn application_entry(&self) -> fn() -> !;
}

/// Lifecycle driver of the loader.
pub struct Loader<P: LoaderPlatform, E: EntryCondition> {
    platform: P,
    entry: E,
    state: LoaderState,
}

impl<P: LoaderPlatform, E: EntryCondition> Loader<P, E> {
    /// Creates an idle loader.
    pub fn new(platform: P, entry: E) -> Self {
        Self {
            platform,
            entry,
            state: LoaderState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> LoaderState {
        self.state
    }

    /// The platform.
    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Decide whether to serve the host at all. When the answer is yes, the
    /// USB connection is cycled so the host enumerates us again.
    pub fn enter(&mut self) -> LoaderState {
        if self.state != LoaderState::Idle {
            return self.state;
        }

        self.platform.init();
        self.platform.feed_watchdog();

        if !self.platform.external_reset() {
            info!("not an external reset, starting application");
            self.state = LoaderState::Handover;
            return self.state;
        }

        self.platform.select_vectors(VectorTable::Loader);

        if !self.entry.should_remain_resident() {
            self.state = LoaderState::Handover;
            return self.state;
        }

        self.platform.disable_watchdog();
        self.platform.clear_reset_flags();

        // force re-enumeration
        self.platform.usb_detach();
        self.platform.delay_ms(P::REENUMERATE_DELAY_MS);
        self.platform.usb_attach();
        self.platform.enable_interrupts();

        info!("loader active");
        self.state = LoaderState::Active;
        self.state
    }

    /// One run-loop evaluation after the transport has been polled.
    pub fn step(&mut self, exit: &mut ExitHysteresis) -> LoaderState {
        if self.state == LoaderState::Active && exit.policy().can_exit() {
            let resident = self.entry.should_remain_resident();
            self.state = exit.poll(resident);
            if self.state != LoaderState::Active {
                info!("leaving loader: {:?}", self.state);
            }
        }
        self.state
    }

    /// Spend the exit delay calling `poll` once per millisecond, then
    /// move on to [`LoaderState::Handover`]. Does nothing unless an exit is
    /// pending.
    pub fn linger<F: FnMut()>(&mut self, mut poll: F) -> LoaderState {
        if self.state == LoaderState::ExitPending {
            for _ in 0..P::EXIT_DELAY_MS {
                poll();
                self.platform.delay_ms(1);
            }
            self.state = LoaderState::Handover;
        }
        self.state
    }

    /// Shut down USB, restore the application's vectors and jump to it.
    ///
    /// With an exit still pending, first waits
    /// [`EXIT_DELAY_MS`](LoaderPlatform::EXIT_DELAY_MS) without polling.
    pub fn handover(&mut self) -> ! {
        if self.state == LoaderState::ExitPending {
            self.platform.delay_ms(P::EXIT_DELAY_MS);
        }
        self.state = LoaderState::Handover;

        self.platform.disable_interrupts();
        self.platform.usb_detach();
        self.platform.exit_hook();
        self.platform.disable_usb_interrupts();
        self.platform.select_vectors(VectorTable::Application);

        let application = self.platform.application_entry();
        application()
    }

    /// Run the loader over `usb_dev` until it hands over to the application.
    pub fn run<B: UsbBus, M: IspMemIO>(
        mut self,
        usb_dev: &mut UsbDevice<'_, B>,
        class: &mut AspLoaderClass<B, M>,
    ) -> ! {
        if self.enter() == LoaderState::Active {
            class.engine_mut().show_banner();
            while self.state == LoaderState::Active {
                usb_dev.poll(&mut [&mut *class]);
                self.step(class.engine_mut().exit_mut());
            }
            self.linger(|| {
                usb_dev.poll(&mut [&mut *class]);
            });
        }
        self.handover()
    }
}
