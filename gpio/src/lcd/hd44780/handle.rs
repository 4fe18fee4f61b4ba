use crate::lcd::hd44780::{
    CursorDirection, DisplayConfig, EngineState, HD44780Engine, LcdError, LcdResult, PinNumbers,
    Timing,
};
use crate::{GpioDriver, GpioResult};
use log::{debug, error, info, warn};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A request for the display worker.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LcdRequest {
    Command(u8),
    Data(u8),
    Clear,
    Home,
    SetCursor { row: usize, col: usize },
    Print(String),
    ShowDisplay(bool),
    ShowCursor(bool),
    BlinkCursor(bool),
    Scroll(CursorDirection),
    MoveCursor(CursorDirection),
    EntryMode { direction: CursorDirection, shift: bool },
    FunctionSet(DisplayConfig),
}

enum Message {
    Request(LcdRequest, Sender<LcdResult<()>>),
    Shutdown,
}

/// Owning handle to a HD44780 display driven from a dedicated worker thread.
///
/// All calls are serialized through a channel, so the handle can be shared between threads
/// without two callers ever interleaving nibbles on the bus. When a request faults the engine,
/// the worker releases the pins and runs the full initialization again before serving the next
/// request. A request that timed out is treated the same way.
pub struct HD44780Handle {
    sender: Sender<Message>,
    worker: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
    timed_out: Arc<AtomicBool>,
}

impl HD44780Handle {
    /// Starts the worker. `open_driver` runs on the worker thread, so the driver itself doesn't
    /// have to be `Send`.
    ///
    /// Returns once the display was initialized for the first time, or with the error that
    /// prevented it, in which case the worker has already stopped.
    pub fn spawn<D, F>(
        open_driver: F,
        numbers: PinNumbers,
        config: DisplayConfig,
        timing: Timing,
    ) -> LcdResult<Self>
    where
        D: GpioDriver + 'static,
        F: FnOnce() -> GpioResult<D> + Send + 'static,
    {
        config.validate()?;

        let (sender, receiver) = mpsc::channel();
        let (ready_sender, ready_receiver) = mpsc::channel();
        let timed_out = Arc::new(AtomicBool::new(false));
        let worker_timed_out = Arc::clone(&timed_out);

        let worker = thread::Builder::new()
            .name("hd44780".to_string())
            .spawn(move || {
                let driver = match open_driver() {
                    Ok(driver) => driver,
                    Err(err) => {
                        let _ = ready_sender.send(Err(LcdError::Driver(err)));
                        return;
                    }
                };
                let mut worker = Worker {
                    driver: &driver,
                    numbers,
                    config,
                    timing,
                    timed_out: worker_timed_out,
                    restarts: 0,
                };
                worker.run(ready_sender, receiver);
            })
            .map_err(|err| LcdError::WorkerSpawn(err.kind()))?;

        match ready_receiver.recv() {
            Ok(Ok(())) => Ok(HD44780Handle {
                sender,
                worker: Some(worker),
                timeout: None,
                timed_out,
            }),
            Ok(Err(err)) => {
                let _ = worker.join();
                Err(err)
            }
            Err(_) => {
                let _ = worker.join();
                Err(LcdError::Disconnected)
            }
        }
    }

    /// Makes every call give up after waiting `timeout` for the worker.
    ///
    /// A timed out request might still be running, so it counts as a failed write: the worker
    /// re-initializes the display before it serves the next request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends a request to the worker and waits for the result.
    pub fn request(&self, request: LcdRequest) -> LcdResult<()> {
        let (reply_sender, reply_receiver) = mpsc::channel();
        self.sender
            .send(Message::Request(request, reply_sender))
            .map_err(|_| LcdError::Disconnected)?;

        match self.timeout {
            Some(timeout) => match reply_receiver.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => {
                    warn!("HD44780 worker did not answer within {:?}", timeout);
                    self.timed_out.store(true, Ordering::SeqCst);
                    Err(LcdError::Timeout)
                }
                Err(RecvTimeoutError::Disconnected) => Err(LcdError::Disconnected),
            },
            None => reply_receiver.recv().map_err(|_| LcdError::Disconnected)?,
        }
    }

    pub fn write_command(&self, command: u8) -> LcdResult<()> {
        self.request(LcdRequest::Command(command))
    }

    pub fn write_data(&self, data: u8) -> LcdResult<()> {
        self.request(LcdRequest::Data(data))
    }

    pub fn clear(&self) -> LcdResult<()> {
        self.request(LcdRequest::Clear)
    }

    pub fn home(&self) -> LcdResult<()> {
        self.request(LcdRequest::Home)
    }

    pub fn set_cursor(&self, row: usize, col: usize) -> LcdResult<()> {
        self.request(LcdRequest::SetCursor { row, col })
    }

    pub fn print(&self, s: &str) -> LcdResult<()> {
        self.request(LcdRequest::Print(s.to_string()))
    }

    pub fn show_display(&self, on: bool) -> LcdResult<()> {
        self.request(LcdRequest::ShowDisplay(on))
    }

    pub fn show_cursor(&self, on: bool) -> LcdResult<()> {
        self.request(LcdRequest::ShowCursor(on))
    }

    pub fn blink_cursor(&self, on: bool) -> LcdResult<()> {
        self.request(LcdRequest::BlinkCursor(on))
    }

    pub fn scroll(&self, direction: CursorDirection) -> LcdResult<()> {
        self.request(LcdRequest::Scroll(direction))
    }

    pub fn function_set(&self, config: DisplayConfig) -> LcdResult<()> {
        self.request(LcdRequest::FunctionSet(config))
    }

    /// Stops the worker and releases the pins.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.sender.send(Message::Shutdown);
            if worker.join().is_err() {
                error!("HD44780 worker panicked");
            }
        }
    }
}

impl Debug for HD44780Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "HD44780Handle(running: {})", self.worker.is_some())
    }
}

impl Drop for HD44780Handle {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<'a> {
    driver: &'a dyn GpioDriver,
    numbers: PinNumbers,
    config: DisplayConfig,
    timing: Timing,
    timed_out: Arc<AtomicBool>,
    restarts: usize,
}

impl<'a> Worker<'a> {
    fn start(&self) -> LcdResult<HD44780Engine<'a>> {
        HD44780Engine::start(self.driver, self.numbers, self.config, self.timing)
    }

    fn run(&mut self, ready: Sender<LcdResult<()>>, receiver: Receiver<Message>) {
        let mut engine = match self.start() {
            Ok(engine) => Some(engine),
            Err(err) => {
                let _ = ready.send(Err(err));
                return;
            }
        };
        let _ = ready.send(Ok(()));
        info!("HD44780 worker running");

        for message in receiver {
            let (request, reply) = match message {
                Message::Request(request, reply) => (request, reply),
                Message::Shutdown => break,
            };

            if self.timed_out.swap(false, Ordering::SeqCst) {
                if let Some(stale) = engine.take() {
                    warn!("HD44780 request timed out, re-initializing");
                    stale.shutdown();
                }
            }

            let result = match engine.as_mut() {
                Some(engine) => self.apply(engine, request),
                None => match self.restart() {
                    Ok(restarted) => self.apply(engine.insert(restarted), request),
                    Err(err) => Err(err),
                },
            };

            if let Some(faulted) = engine.take_if(|engine| engine.state() == EngineState::Faulted) {
                warn!("HD44780 engine faulted, re-initializing before the next request");
                faulted.shutdown();
            }

            let _ = reply.send(result);
        }

        if let Some(engine) = engine {
            engine.shutdown();
        }
        debug!("HD44780 worker stopped after {} restarts", self.restarts);
    }

    fn restart(&mut self) -> LcdResult<HD44780Engine<'a>> {
        self.restarts += 1;
        info!("Re-initializing HD44780 (restart #{})", self.restarts);
        self.start().inspect_err(|err| error!("HD44780 re-initialization failed: {}", err))
    }

    fn apply(&mut self, engine: &mut HD44780Engine<'a>, request: LcdRequest) -> LcdResult<()> {
        match request {
            LcdRequest::Command(command) => engine.write_command(command),
            LcdRequest::Data(data) => engine.write_data(data),
            LcdRequest::Clear => engine.clear_display(),
            LcdRequest::Home => engine.return_home(),
            LcdRequest::SetCursor { row, col } => engine.set_cursor(row, col),
            LcdRequest::Print(s) => engine.print(&s),
            LcdRequest::ShowDisplay(on) => engine.show_display(on),
            LcdRequest::ShowCursor(on) => engine.show_cursor(on),
            LcdRequest::BlinkCursor(on) => engine.blink_cursor(on),
            LcdRequest::Scroll(direction) => engine.scroll(direction),
            LcdRequest::MoveCursor(direction) => engine.move_cursor(direction),
            LcdRequest::EntryMode { direction, shift } => engine.set_entry_mode(direction, shift),
            LcdRequest::FunctionSet(config) => {
                engine.function_set(config)?;
                // Restarts come back up with the new layout.
                self.config = config;
                Ok(())
            }
        }
    }
}
