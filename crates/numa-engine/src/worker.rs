use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use numa_contracts::meals::MealAnalysis;
use numa_contracts::profile::{OnboardingStatus, OnboardingUpdate, Profile};

use crate::documents::DocumentStore;
use crate::profile_store::ProfileStore;

/// A result that will be delivered once by a background thread.
#[derive(Debug)]
pub struct Pending<T> {
    rx: mpsc::Receiver<T>,
}

impl<T> Pending<T> {
    pub(crate) fn channel() -> (mpsc::Sender<T>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// Blocks until the value arrives.
    pub fn wait(self) -> Result<T> {
        self.rx
            .recv()
            .map_err(|_| anyhow!("background task ended without a result"))
    }

    /// `Ok(None)` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(value) => Ok(Some(value)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(anyhow!("background task ended without a result"))
            }
        }
    }

    /// Non-blocking poll.
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

enum ProfileCommand {
    SaveOnboarding(OnboardingUpdate, mpsc::Sender<Result<()>>),
    CompleteOnboarding(mpsc::Sender<Result<()>>),
    Verify(mpsc::Sender<OnboardingStatus>),
    SaveMeal(MealAnalysis, mpsc::Sender<Result<()>>),
    Meals(mpsc::Sender<Result<Vec<MealAnalysis>>>),
    Snapshot(mpsc::Sender<Option<Profile>>),
    Describe(mpsc::Sender<String>),
    Reset(mpsc::Sender<Result<()>>),
    Stop,
}

/// Runs a [`ProfileStore`] on one dedicated thread.
///
/// Commands are served strictly in send order, so every profile mutation
/// happens on the same thread. Each request returns a [`Pending`] that
/// resolves once the worker has handled it.
pub struct ProfileWorker {
    sender: Option<mpsc::Sender<ProfileCommand>>,
    handle: Option<thread::JoinHandle<Result<()>>>,
}

impl ProfileWorker {
    /// Starts the worker; the store is initialized on the worker thread
    /// before any command is served.
    pub fn spawn<D>(store: ProfileStore<D>) -> Result<Self>
    where
        D: DocumentStore + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("numa-profile".to_string())
            .spawn(move || run_worker(store, rx))
            .map_err(|err| anyhow!("profile worker spawn failed: {err}"))?;
        Ok(Self {
            sender: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn save_onboarding_data(&self, update: OnboardingUpdate) -> Pending<Result<()>> {
        self.request(|reply| ProfileCommand::SaveOnboarding(update, reply))
    }

    pub fn complete_onboarding(&self) -> Pending<Result<()>> {
        self.request(ProfileCommand::CompleteOnboarding)
    }

    pub fn verify_onboarding_data(&self) -> Pending<OnboardingStatus> {
        self.request(ProfileCommand::Verify)
    }

    pub fn save_meal_analysis(&self, meal: MealAnalysis) -> Pending<Result<()>> {
        self.request(|reply| ProfileCommand::SaveMeal(meal, reply))
    }

    pub fn get_user_meals(&self) -> Pending<Result<Vec<MealAnalysis>>> {
        self.request(ProfileCommand::Meals)
    }

    pub fn current_profile(&self) -> Pending<Option<Profile>> {
        self.request(ProfileCommand::Snapshot)
    }

    pub fn describe_profile(&self) -> Pending<String> {
        self.request(ProfileCommand::Describe)
    }

    pub fn reset(&self) -> Pending<Result<()>> {
        self.request(ProfileCommand::Reset)
    }

    /// Stops after the queued commands and flushes the store.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn request<T>(&self, command: impl FnOnce(mpsc::Sender<T>) -> ProfileCommand) -> Pending<T> {
        let (reply, pending) = Pending::channel();
        if let Some(sender) = &self.sender {
            if sender.send(command(reply)).is_err() {
                log::error!("profile worker is gone; request dropped");
            }
        }
        pending
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(ProfileCommand::Stop);
        }
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("profile worker panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ProfileWorker {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("profile worker shutdown failed: {err:#}");
        }
    }
}

fn run_worker<D: DocumentStore>(
    mut store: ProfileStore<D>,
    rx: mpsc::Receiver<ProfileCommand>,
) -> Result<()> {
    store.initialize();

    // Replies go to callers that may have stopped waiting; ignore send errors.
    while let Ok(command) = rx.recv() {
        match command {
            ProfileCommand::SaveOnboarding(update, reply) => {
                let _ = reply.send(store.save_onboarding_data(&update));
            }
            ProfileCommand::CompleteOnboarding(reply) => {
                let _ = reply.send(store.complete_onboarding());
            }
            ProfileCommand::Verify(reply) => {
                let _ = reply.send(store.verify_onboarding_data());
            }
            ProfileCommand::SaveMeal(meal, reply) => {
                let _ = reply.send(store.save_meal_analysis(&meal));
            }
            ProfileCommand::Meals(reply) => {
                let _ = reply.send(store.get_user_meals());
            }
            ProfileCommand::Snapshot(reply) => {
                let _ = reply.send(store.current_profile().cloned());
            }
            ProfileCommand::Describe(reply) => {
                let _ = reply.send(store.describe_profile());
            }
            ProfileCommand::Reset(reply) => {
                let _ = reply.send(store.reset());
            }
            ProfileCommand::Stop => break,
        }
    }

    store.shutdown()
}
