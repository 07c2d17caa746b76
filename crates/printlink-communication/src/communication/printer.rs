//! Printer session
//!
//! [`Printer`] owns the transport and the two worker threads that stream
//! the send buffer and correlate responses. Callers append commands with
//! [`Printer::send_line`] or block on a specific answer with
//! [`Printer::get_response`].

use crate::communication::activity::{guarded, Activity, Exit};
use crate::communication::frame::prepare_line;
use crate::communication::pacer::run_sender;
use crate::communication::receiver::run_receiver;
use crate::communication::response_log::{WaitFailure, WaitOutcome};
use crate::communication::serial::SerialTransport;
use crate::communication::session::{Session, TemperatureReading};
use crate::communication::{ConnectionParams, Transport};
use crate::firmware::marlin;
use parking_lot::{Mutex, RwLock};
use printlink_core::{ConnectionError, ProtocolError, Result, SessionError};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Span};

const SENDER_THREAD: &str = "printlink-sender";
const RECEIVER_THREAD: &str = "printlink-receiver";

/// Timing knobs for a [`Printer`]
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterOptions {
    /// How often a sender blocked on an ack re-checks for a stop request
    pub ack_poll_interval: Duration,
    /// Sleep between buffer polls when there is nothing to send
    pub idle_poll_interval: Duration,
    /// Join bound for a worker whose transport has no timeout
    pub default_join_timeout: Duration,
    /// Bound on the boot banner wait in `connect`; `None` waits until the
    /// receiver dies
    pub banner_timeout: Option<Duration>,
}

impl Default for PrinterOptions {
    fn default() -> Self {
        Self {
            ack_poll_interval: Duration::from_secs(1),
            idle_poll_interval: Duration::from_millis(10),
            default_join_timeout: Duration::from_secs(10),
            banner_timeout: None,
        }
    }
}

/// Whether a transport is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport
    Disconnected,
    /// A transport is attached
    Connected,
}

/// Opens a transport from connection parameters
pub type TransportOpener =
    Box<dyn Fn(&ConnectionParams) -> Result<Arc<dyn Transport>> + Send + Sync>;

fn open_serial(params: &ConnectionParams) -> Result<Arc<dyn Transport>> {
    Ok(Arc::new(SerialTransport::open(params)?))
}

struct Attachment {
    transport: Option<Arc<dyn Transport>>,
    owns_transport: bool,
    sender: Option<Activity>,
    receiver: Option<Activity>,
    span: Span,
}

impl Attachment {
    fn empty() -> Self {
        Self {
            transport: None,
            owns_transport: false,
            sender: None,
            receiver: None,
            span: Span::none(),
        }
    }
}

fn is_alive(activity: &Option<Activity>) -> bool {
    activity.as_ref().is_some_and(Activity::is_running)
}

/// A printer driven over a line-numbered, acknowledged link
pub struct Printer {
    params: ConnectionParams,
    options: PrinterOptions,
    opener: TransportOpener,
    /// Replaced on every `connect`; workers keep the handles they started with
    session: RwLock<Session>,
    /// Serializes connect, disconnect and start
    lifecycle: Mutex<()>,
    attachment: Mutex<Attachment>,
}

impl Printer {
    /// Create a printer that opens a serial port with `params` on connect
    pub fn new(params: ConnectionParams) -> Self {
        Self::with_options(params, PrinterOptions::default())
    }

    /// Create a printer with custom timing
    pub fn with_options(params: ConnectionParams, options: PrinterOptions) -> Self {
        Self::with_opener(params, options, Box::new(open_serial))
    }

    /// Create a printer that opens its transport with `opener`
    pub fn with_opener(
        params: ConnectionParams,
        options: PrinterOptions,
        opener: TransportOpener,
    ) -> Self {
        Self {
            params,
            options,
            opener,
            session: RwLock::new(Session::new()),
            lifecycle: Mutex::new(()),
            attachment: Mutex::new(Attachment::empty()),
        }
    }

    /// Connection parameters used by `connect(None)`
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Timing options
    pub fn options(&self) -> &PrinterOptions {
        &self.options
    }

    /// Attach a transport and start the receiver.
    ///
    /// With `None`, a transport is opened from the stored parameters and
    /// closed again on disconnect; the call then blocks until the printer's
    /// boot banner has been read and set aside. A transport passed in is
    /// used as is and never closed by the printer.
    pub fn connect(&self, transport: Option<Arc<dyn Transport>>) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.attachment.lock().transport.is_some() {
            return Err(SessionError::AlreadyConnected.into());
        }

        let (transport, owns_transport) = match transport {
            Some(transport) => (transport, false),
            None => ((self.opener)(&self.params)?, true),
        };

        let session = self.session().renewed();
        *self.session.write() = session.clone();

        let span = info_span!(
            "printer",
            port = %transport.name(),
            session = %uuid::Uuid::new_v4()
        );
        if owns_transport {
            session.banner.arm();
        }

        {
            let mut attachment = self.attachment.lock();
            attachment.transport = Some(transport.clone());
            attachment.owns_transport = owns_transport;
            attachment.span = span.clone();
            if let Err(e) = self.spawn_receiver(&mut attachment) {
                attachment.transport = None;
                drop(attachment);
                self.close_owned(&transport, owns_transport);
                return Err(e);
            }
        }

        if owns_transport {
            let banner_received = session.banner.wait_for_banner(
                || self.is_receiver_running(),
                self.options.idle_poll_interval,
                self.options.banner_timeout,
            );
            session.banner.disarm();
            if !banner_received {
                self.teardown();
                return Err(ConnectionError::ConnectionLost {
                    reason: format!("no response from {} after opening it", transport.name()),
                }
                .into());
            }
        }

        let _entered = span.enter();
        info!("Connected to {}", transport.name());
        Ok(())
    }

    /// Stop both workers and detach the transport.
    ///
    /// New appends are refused from here until the next `connect`. With
    /// `wait`, first blocks until every buffered command has a response or
    /// one of the workers stops. Never fails; calling it while disconnected
    /// is a no-op apart from refusing appends.
    pub fn disconnect(&self, wait: bool) {
        self.session()
            .flags
            .disconnect_pending
            .store(true, Ordering::SeqCst);

        let _lifecycle = self.lifecycle.lock();
        let session = self.session();
        if wait {
            while session.buffer.len() > session.responses.len()
                && self.is_receiver_running()
                && self.is_sender_running()
            {
                thread::sleep(self.options.idle_poll_interval);
            }
        }
        self.teardown();
    }

    fn teardown(&self) {
        let (transport, owns_transport, sender, receiver) = {
            let mut attachment = self.attachment.lock();
            (
                attachment.transport.take(),
                std::mem::take(&mut attachment.owns_transport),
                attachment.sender.take(),
                attachment.receiver.take(),
            )
        };

        let session = self.session();
        let read_timeout = transport.as_ref().and_then(|t| t.read_timeout());
        let write_timeout = transport.as_ref().and_then(|t| t.write_timeout());

        if let Some(sender) = sender {
            session.request_stop_sending();
            sender.join_timeout(self.join_bound(write_timeout));
        }
        if let Some(receiver) = receiver {
            session.request_stop_receiving();
            receiver.join_timeout(self.join_bound(read_timeout));
        }

        if let Some(transport) = &transport {
            self.close_owned(transport, owns_transport);
        }

        session.reset();
        debug!("Disconnected from printer");
    }

    fn join_bound(&self, transport_timeout: Option<Duration>) -> Duration {
        transport_timeout
            .map(|t| t + Duration::from_secs(1))
            .unwrap_or(self.options.default_join_timeout)
    }

    fn close_owned(&self, transport: &Arc<dyn Transport>, owns_transport: bool) {
        if !owns_transport {
            return;
        }
        if let Err(e) = transport.close() {
            warn!("Failed to close {}: {}", transport.name(), e);
        }
    }

    /// Ensure both the sender and the receiver are running
    pub fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock();
        let mut attachment = self.attachment.lock();
        if attachment.transport.is_none() {
            return Err(ConnectionError::NotConnected.into());
        }

        let session = self.session();
        if !is_alive(&attachment.receiver) {
            session
                .flags
                .stop_receiving
                .store(false, Ordering::SeqCst);
            self.spawn_receiver(&mut attachment)?;
        }
        if !is_alive(&attachment.sender) {
            session
                .flags
                .stop_sending
                .store(false, Ordering::SeqCst);
            self.spawn_sender(&mut attachment)?;
        }
        Ok(())
    }

    fn spawn_receiver(&self, attachment: &mut Attachment) -> Result<()> {
        let transport = attachment
            .transport
            .clone()
            .ok_or(ConnectionError::NotConnected)?;
        let session = self.session();
        session.responses.open();

        let activity = Activity::spawn(RECEIVER_THREAD, attachment.span.clone(), move || {
            match guarded(|| run_receiver(&session, transport.as_ref())) {
                Exit::Clean => session.responses.close(WaitFailure::Cancelled),
                Exit::Faulted(fault) => {
                    error!("Receiver stopped: {}", fault);
                    session.halt();
                    session.responses.close(WaitFailure::Fault(fault));
                }
                Exit::Panicked(msg) => {
                    error!("Receiver panicked: {}", msg);
                    session.halt();
                    session.responses.close(WaitFailure::Cancelled);
                }
            }
        })?;
        attachment.receiver = Some(activity);
        Ok(())
    }

    fn spawn_sender(&self, attachment: &mut Attachment) -> Result<()> {
        let transport = attachment
            .transport
            .clone()
            .ok_or(ConnectionError::NotConnected)?;
        let session = self.session();
        let options = self.options.clone();

        let activity = Activity::spawn(SENDER_THREAD, attachment.span.clone(), move || {
            match guarded(|| run_sender(&session, transport.as_ref(), &options)) {
                Exit::Clean => {}
                Exit::Faulted(fault) => {
                    error!("Sender stopped: {}", fault);
                    // The log must close before the halt lets the receiver exit.
                    session.responses.close(WaitFailure::Fault(fault));
                    session.halt();
                }
                Exit::Panicked(msg) => {
                    error!("Sender panicked: {}", msg);
                    session.responses.close(WaitFailure::Cancelled);
                    session.halt();
                }
            }
            session.flags.printing.store(false, Ordering::SeqCst);
        })?;
        attachment.sender = Some(activity);
        Ok(())
    }

    fn session(&self) -> Session {
        self.session.read().clone()
    }

    fn append(session: &Session, line: &str) -> Result<Option<usize>> {
        if session.is_disconnect_pending() {
            return Err(SessionError::DisconnectPending {
                line: line.to_string(),
            }
            .into());
        }
        Ok(prepare_line(line).map(|command| session.buffer.push(command)))
    }

    /// Queue `line` for sending.
    ///
    /// Comments are stripped; a line that is empty afterwards is dropped.
    pub fn send_line(&self, line: &str) -> Result<()> {
        Self::append(&self.session(), line)?;
        Ok(())
    }

    /// Queue `line` and block until its response arrives.
    ///
    /// Returns an empty string if `timeout` elapses first. Fails at once
    /// when the receiver is not running, and with the receiver's fault if
    /// it dies while we wait.
    pub fn get_response(&self, line: &str, timeout: Option<Duration>) -> Result<String> {
        let session = self.session();
        let index = Self::append(&session, line)?.ok_or(ProtocolError::EmptyFrame)?;
        let slot = session.responses.register(index);
        if !slot.is_settled() && !self.is_receiver_running() {
            return Err(SessionError::ReceiverNotRunning.into());
        }

        match slot.wait(timeout) {
            WaitOutcome::Ready(response) => Ok(response),
            WaitOutcome::TimedOut => {
                debug!(index, "Timed out waiting for response");
                Ok(String::new())
            }
            WaitOutcome::Failed(WaitFailure::Cancelled) => Err(SessionError::ReceiverStopped.into()),
            WaitOutcome::Failed(WaitFailure::Fault(fault)) => Err(fault.into()),
        }
    }

    /// Queue every non-empty, comment-stripped line of a G-code file.
    ///
    /// Returns the number of commands queued.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let session = self.session();
        if session.is_disconnect_pending() {
            return Err(SessionError::DisconnectPending {
                line: path.display().to_string(),
            }
            .into());
        }

        let content = fs::read_to_string(path)?;
        let commands: Vec<String> = content.lines().filter_map(prepare_line).collect();
        let count = commands.len();
        session.buffer.extend(commands);
        debug!("Loaded {} commands from {}", count, path.display());
        Ok(count)
    }

    /// Ask the printer for its position (`M114`)
    pub fn current_position(&self) -> Result<HashMap<String, f64>> {
        let response = self.get_response(marlin::POSITION_QUERY, None)?;
        Ok(marlin::parse_position(&response)?)
    }

    /// Queue a line-number reset (`M110 N0`)
    pub fn reset_line_number(&self) -> Result<()> {
        self.send_line(marlin::RESET_LINE_NUMBER_COMMAND)
    }

    /// Hold or release the sender. Frames already written are unaffected.
    pub fn set_paused(&self, paused: bool) {
        self.session().pause.set(paused);
        if paused {
            info!("Printer paused");
        } else {
            info!("Printer resumed");
        }
    }

    /// Whether the sender is held
    pub fn is_paused(&self) -> bool {
        self.session().pause.is_paused()
    }

    /// Whether the sender has unsent or unacknowledged work
    pub fn is_printing(&self) -> bool {
        self.session().is_printing()
    }

    /// Completed responses, in transmission order
    pub fn responses(&self) -> Vec<String> {
        self.session().responses.snapshot()
    }

    /// Commands written to the transport, retransmissions included
    pub fn sent_lines(&self) -> Vec<String> {
        self.session().sent_lines.lock().clone()
    }

    /// Temperature reports, oldest first
    pub fn temperature_readings(&self) -> Vec<TemperatureReading> {
        self.session().temperatures.lock().clone()
    }

    /// Banner read and set aside by the last `connect`
    pub fn banner(&self) -> Vec<String> {
        self.session().banner.lines()
    }

    /// Every command queued since `connect`
    pub fn buffered_lines(&self) -> Vec<String> {
        self.session().buffer.snapshot()
    }

    /// Index of the next command the sender will write
    pub fn cursor(&self) -> usize {
        self.session().link.cursor()
    }

    /// Whether a transport is attached
    pub fn state(&self) -> SessionState {
        if self.attachment.lock().transport.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    /// Shorthand for `state() == SessionState::Connected`
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Whether the sender thread is alive
    pub fn is_sender_running(&self) -> bool {
        is_alive(&self.attachment.lock().sender)
    }

    /// Whether the receiver thread is alive
    pub fn is_receiver_running(&self) -> bool {
        is_alive(&self.attachment.lock().receiver)
    }
}

impl Drop for Printer {
    fn drop(&mut self) {
        if self.is_connected() {
            self.disconnect(false);
        }
    }
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer")
            .field("params", &self.params)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
