//! Operation tokens and in-flight transactions

use dualtrack_core::{
    FormatSelection, PlayableLocator, PlayerError, PlayerResult, TrackKind, TrackPair,
};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Reply channel of a suspended caller
pub(crate) type Reply = oneshot::Sender<PlayerResult<()>>;

/// Generation captured by an operation when it starts
///
/// Asynchronous completions compare their token with the current generation
/// and discard themselves when a newer operation has started since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperationToken(u64);

impl std::fmt::Display for OperationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Monotonic generation counter
#[derive(Debug, Default)]
pub(crate) struct OperationCounter {
    current: u64,
}

impl OperationCounter {
    /// Start a new generation, invalidating every earlier token
    pub(crate) fn next(&mut self) -> OperationToken {
        self.current += 1;
        OperationToken(self.current)
    }

    pub(crate) fn is_current(&self, token: OperationToken) -> bool {
        token.0 == self.current
    }
}

/// Progress of a format switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchPhase {
    /// Waiting for the new locator
    Resolving,
    /// New locator assigned, waiting for first data
    Reloading,
    /// Positioned at the target, waiting for both tracks
    Buffering,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransactionKind {
    /// Waiting for both tracks before starting playback
    Play,
    /// Repositioning both tracks
    Seek,
    /// Replacing one track's locator
    Switch {
        track: TrackKind,
        format_id: String,
        phase: SwitchPhase,
    },
}

/// A transport operation that owns the tracks until both are ready
#[derive(Debug)]
pub(crate) struct Transaction {
    pub(crate) token: OperationToken,
    pub(crate) kind: TransactionKind,
    /// Position both tracks must reach (seek and switch)
    pub(crate) target: Option<f64>,
    /// Whether playback resumes on completion
    pub(crate) resume: bool,
    /// Whether the final audio re-alignment was issued
    pub(crate) aligned: bool,
    pub(crate) started: Instant,
    caller: Option<Reply>,
    /// `play()` callers waiting for the transaction to resume playback
    followers: Vec<Reply>,
}

impl Transaction {
    pub(crate) fn play(token: OperationToken, caller: Option<Reply>) -> Self {
        Self::new(token, TransactionKind::Play, None, true, caller)
    }

    pub(crate) fn seek(token: OperationToken, target: f64, resume: bool, caller: Reply) -> Self {
        Self::new(token, TransactionKind::Seek, Some(target), resume, Some(caller))
    }

    pub(crate) fn switch(
        token: OperationToken,
        track: TrackKind,
        format_id: String,
        target: f64,
        resume: bool,
        caller: Reply,
    ) -> Self {
        let kind = TransactionKind::Switch {
            track,
            format_id,
            phase: SwitchPhase::Resolving,
        };
        Self::new(token, kind, Some(target), resume, Some(caller))
    }

    fn new(
        token: OperationToken,
        kind: TransactionKind,
        target: Option<f64>,
        resume: bool,
        caller: Option<Reply>,
    ) -> Self {
        Self {
            token,
            kind,
            target,
            resume,
            aligned: false,
            started: Instant::now(),
            caller,
            followers: Vec::new(),
        }
    }

    /// Operation name used in errors and logs
    pub(crate) fn name(&self) -> &'static str {
        match self.kind {
            TransactionKind::Play => "play",
            TransactionKind::Seek => "seek",
            TransactionKind::Switch { .. } => "set_format",
        }
    }

    pub(crate) fn is_play(&self) -> bool {
        matches!(self.kind, TransactionKind::Play)
    }

    /// Switch phase, when this is a switch
    pub(crate) fn switch_phase(&self) -> Option<(TrackKind, SwitchPhase)> {
        match &self.kind {
            TransactionKind::Switch { track, phase, .. } => Some((*track, *phase)),
            _ => None,
        }
    }

    pub(crate) fn set_switch_phase(&mut self, next: SwitchPhase) {
        if let TransactionKind::Switch { phase, .. } = &mut self.kind {
            *phase = next;
        }
    }

    /// Attach a `play()` caller
    pub(crate) fn follow(&mut self, reply: Reply) {
        self.followers.push(reply);
    }

    pub(crate) fn adopt(&mut self, followers: Vec<Reply>) {
        self.followers.extend(followers);
    }

    /// Drop the intent to resume; waiting `play()` callers are released
    pub(crate) fn cancel_resume(&mut self) -> Vec<Reply> {
        self.resume = false;
        std::mem::take(&mut self.followers)
    }

    /// Split into the superseded caller and the callers that carry over
    ///
    /// A pending play's own caller carries over too: a seek or switch issued
    /// while waiting to play resumes playback on completion.
    pub(crate) fn supersede(mut self) -> (Option<Reply>, Vec<Reply>) {
        let mut carried = std::mem::take(&mut self.followers);
        if self.is_play() {
            carried.extend(self.caller.take());
            return (None, carried);
        }
        (self.caller.take(), carried)
    }

    /// Every caller waiting on this transaction
    pub(crate) fn into_replies(mut self) -> Vec<Reply> {
        let mut replies = std::mem::take(&mut self.followers);
        replies.extend(self.caller.take());
        replies
    }
}

/// Initialization in progress
#[derive(Debug)]
pub(crate) struct InitTransaction {
    pub(crate) token: OperationToken,
    pub(crate) selection: FormatSelection,
    pub(crate) resolved: TrackPair<Option<PlayableLocator>>,
    /// Start playing once ready
    pub(crate) play_after: bool,
    caller: Option<Reply>,
    followers: Vec<Reply>,
}

impl InitTransaction {
    pub(crate) fn new(
        token: OperationToken,
        selection: FormatSelection,
        play_after: bool,
        caller: Option<Reply>,
    ) -> Self {
        Self {
            token,
            selection,
            resolved: TrackPair::default(),
            play_after,
            caller,
            followers: Vec::new(),
        }
    }

    pub(crate) fn follow(&mut self, reply: Reply) {
        self.play_after = true;
        self.followers.push(reply);
    }

    pub(crate) fn cancel_play(&mut self) -> Vec<Reply> {
        self.play_after = false;
        std::mem::take(&mut self.followers)
    }

    /// Both locators, once resolved
    pub(crate) fn take_locators(&mut self) -> Option<TrackPair<PlayableLocator>> {
        if self.resolved.video.is_some() && self.resolved.audio.is_some() {
            let video = self.resolved.video.take()?;
            let audio = self.resolved.audio.take()?;
            return Some(TrackPair::new(video, audio));
        }
        None
    }

    /// Split into the caller and the `play()` callers waiting behind it
    pub(crate) fn into_parts(mut self) -> (Option<Reply>, Vec<Reply>) {
        (self.caller.take(), std::mem::take(&mut self.followers))
    }
}

/// Error handed to a caller whose operation was replaced
pub(crate) fn superseded(operation: &str) -> PlayerError {
    PlayerError::Superseded {
        operation: operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_invalidates_older_tokens() {
        let mut counter = OperationCounter::default();
        let first = counter.next();
        assert!(counter.is_current(first));
        let second = counter.next();
        assert!(!counter.is_current(first));
        assert!(counter.is_current(second));
        assert!(second > first);
        assert_eq!(second.to_string(), "op#2");
    }

    #[tokio::test]
    async fn test_superseded_seek_reports_caller() {
        let mut counter = OperationCounter::default();
        let (caller, caller_rx) = oneshot::channel();
        let (follower, follower_rx) = oneshot::channel();
        let mut seek = Transaction::seek(counter.next(), 5.0, true, caller);
        seek.follow(follower);

        let (replaced, carried) = seek.supersede();
        assert!(replaced.is_some());
        assert_eq!(carried.len(), 1);
        drop(replaced);
        drop(carried);
        assert!(caller_rx.await.is_err());
        assert!(follower_rx.await.is_err());
    }

    #[test]
    fn test_superseded_play_carries_its_caller() {
        let mut counter = OperationCounter::default();
        let (caller, _rx) = oneshot::channel();
        let play = Transaction::play(counter.next(), Some(caller));
        let (replaced, carried) = play.supersede();
        assert!(replaced.is_none());
        assert_eq!(carried.len(), 1);
    }

    #[test]
    fn test_switch_phase_updates() {
        let mut counter = OperationCounter::default();
        let (caller, _rx) = oneshot::channel();
        let mut switch = Transaction::switch(
            counter.next(),
            TrackKind::Video,
            "299".to_string(),
            42.0,
            true,
            caller,
        );
        assert_eq!(switch.name(), "set_format");
        assert_eq!(
            switch.switch_phase(),
            Some((TrackKind::Video, SwitchPhase::Resolving))
        );
        switch.set_switch_phase(SwitchPhase::Reloading);
        assert_eq!(
            switch.switch_phase(),
            Some((TrackKind::Video, SwitchPhase::Reloading))
        );
    }

    #[test]
    fn test_init_waits_for_both_locators() {
        let mut counter = OperationCounter::default();
        let mut init = InitTransaction::new(
            counter.next(),
            FormatSelection::default(),
            false,
            None,
        );
        init.resolved.video = Some(PlayableLocator::new("https://cdn/v", None));
        assert!(init.take_locators().is_none());
        init.resolved.audio = Some(PlayableLocator::new("https://cdn/a", None));
        let locators = init.take_locators().unwrap();
        assert_eq!(locators.audio.url, "https://cdn/a");
    }
}
