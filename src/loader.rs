use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::Result;

use crate::dicom::{describe_load_error, load_frame, PixelFrame};

pub type DecodeFn = Arc<dyn Fn(&Path) -> Result<PixelFrame> + Send + Sync>;

#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        index: usize,
        frame: PixelFrame,
    },
    Failed {
        index: usize,
        path: PathBuf,
        message: String,
    },
}

impl LoadEvent {
    pub fn index(&self) -> usize {
        match self {
            Self::Loaded { index, .. } | Self::Failed { index, .. } => *index,
        }
    }
}

struct DecodeJob {
    generation: u64,
    index: usize,
    path: PathBuf,
}

/// Single-slot mailbox between the UI and the decode worker. A new request
/// replaces one the worker has not picked up yet.
#[derive(Default)]
struct Mailbox {
    latest: Option<DecodeJob>,
    closed: bool,
}

type SharedMailbox = Arc<(Mutex<Mailbox>, Condvar)>;

fn lock_mailbox(lock: &Mutex<Mailbox>) -> MutexGuard<'_, Mailbox> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decodes frames on one background worker, so at most one decode runs at a
/// time. Only the result of the latest request is ever handed out; requests
/// superseded before the worker reaches them are never decoded, and anything
/// older that finishes anyway is dropped on `poll`.
pub struct FrameLoader {
    mailbox: SharedMailbox,
    receiver: Receiver<(u64, LoadEvent)>,
    generation: u64,
    in_flight: Option<(usize, PathBuf)>,
}

impl Default for FrameLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoader {
    pub fn new() -> Self {
        Self::with_decoder(Arc::new(load_frame))
    }

    pub fn with_decoder(decode: DecodeFn) -> Self {
        let (sender, receiver) = mpsc::channel();
        let mailbox: SharedMailbox = Arc::new((Mutex::new(Mailbox::default()), Condvar::new()));
        let worker_mailbox = Arc::clone(&mailbox);
        thread::spawn(move || run_worker(decode, worker_mailbox, sender));

        Self {
            mailbox,
            receiver,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn request(&mut self, index: usize, path: PathBuf) {
        self.generation = self.generation.wrapping_add(1);
        self.in_flight = Some((index, path.clone()));
        self.post(Some(DecodeJob {
            generation: self.generation,
            index,
            path,
        }));
    }

    /// Forgets the in-flight request; its result will be discarded.
    pub fn cancel(&mut self) {
        if self.in_flight.take().is_some() {
            self.generation = self.generation.wrapping_add(1);
            self.post(None);
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn poll(&mut self) -> Option<LoadEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok((generation, event))
                    if generation == self.generation && self.in_flight.is_some() =>
                {
                    self.in_flight = None;
                    return Some(event);
                }
                Ok((generation, event)) => {
                    log::debug!(
                        "Dropping stale decode result for index {} (generation {generation})",
                        event.index()
                    );
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => {
                    let (index, path) = self.in_flight.take()?;
                    log::error!("Decode worker stopped while loading {}", path.display());
                    return Some(LoadEvent::Failed {
                        index,
                        path,
                        message: "Error loading image: the decoder stopped unexpectedly."
                            .to_string(),
                    });
                }
            }
        }
    }

    fn post(&self, job: Option<DecodeJob>) {
        let (lock, ready) = &*self.mailbox;
        lock_mailbox(lock).latest = job;
        ready.notify_one();
    }
}

impl Drop for FrameLoader {
    fn drop(&mut self) {
        let (lock, ready) = &*self.mailbox;
        let mut mailbox = lock_mailbox(lock);
        mailbox.closed = true;
        mailbox.latest = None;
        ready.notify_one();
    }
}

fn run_worker(decode: DecodeFn, mailbox: SharedMailbox, sender: Sender<(u64, LoadEvent)>) {
    while let Some(DecodeJob {
        generation,
        index,
        path,
    }) = next_job(&mailbox)
    {
        let event = match decode(&path) {
            Ok(frame) => LoadEvent::Loaded { index, frame },
            Err(err) => {
                log::error!("Failed to decode {}: {err:#}", path.display());
                LoadEvent::Failed {
                    index,
                    message: describe_load_error(&err),
                    path,
                }
            }
        };
        if sender.send((generation, event)).is_err() {
            break;
        }
    }
    log::debug!("Decode worker exiting");
}

fn next_job(mailbox: &SharedMailbox) -> Option<DecodeJob> {
    let (lock, ready) = &**mailbox;
    let mut state = lock_mailbox(lock);
    loop {
        if state.closed {
            return None;
        }
        if let Some(job) = state.latest.take() {
            return Some(job);
        }
        state = ready.wait(state).unwrap_or_else(PoisonError::into_inner);
    }
}
