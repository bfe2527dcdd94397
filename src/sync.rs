//! The incremental sync run.
//!
//! A run walks a fixed sequence of gates: validate the source token, read the
//! checkpoint, capture the candidate checkpoint, fetch, extract, make sure Anki is up,
//! make sure the deck and note type exist, create cards, and finally decide whether the
//! candidate may be committed. Any gate may end the run early; only the outcomes that
//! leave no pending work behind move the checkpoint forward.

use chrono::{DateTime, Utc};

use crate::anki::{CardOutcome, FlashcardTarget, NoteId};
use crate::card::build_card;
use crate::checkpoint::Checkpoint;
use crate::config::{Config, MatchField, TemplateFields};
use crate::error::{SourceError, SyncError};
use crate::extract::{DefinitionRecord, extract_definitions};
use crate::readwise::HighlightSource;

pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub enum SyncResult {
    Created(NoteId),
    Duplicate,
    Error,
}

impl SyncResult {
    pub fn record(self, stats: &mut SyncStats) {
        match self {
            SyncResult::Created(_) => stats.created += 1,
            SyncResult::Duplicate => stats.duplicates += 1,
            SyncResult::Error => stats.failed += 1,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub created: u32,
    pub duplicates: u32,
    pub failed: u32,
}

impl SyncStats {
    /// Everything failing means retrying next run can still help, so the checkpoint
    /// stays put. Any delivered card (created or already there) lets it advance.
    pub fn should_commit(&self) -> bool {
        !(self.failed > 0 && self.created == 0 && self.duplicates == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    NothingNew { committed: bool },
    Completed { stats: SyncStats, committed: bool },
    DryRun { definitions: usize },
}

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub deck: String,
    pub model: String,
    pub fields: TemplateFields,
    pub duplicate_check: bool,
    pub match_on: MatchField,
    pub dry_run: bool,
}

impl SyncSettings {
    pub fn from_config(cfg: &Config, dry_run: bool) -> Self {
        Self {
            deck: cfg.anki.deck.clone(),
            model: cfg.anki.model.clone(),
            fields: cfg.anki.template_fields(),
            duplicate_check: cfg.anki.duplicate_check,
            match_on: cfg.readwise.match_on,
            dry_run,
        }
    }
}

pub struct Syncer<S, T> {
    source: S,
    target: T,
    checkpoint: Checkpoint,
    settings: SyncSettings,
    clock: Clock,
}

impl<S: HighlightSource, T: FlashcardTarget> Syncer<S, T> {
    pub fn new(source: S, target: T, checkpoint: Checkpoint, settings: SyncSettings) -> Self {
        Self {
            source,
            target,
            checkpoint,
            settings,
            clock: Box::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn run(&self) -> Result<RunOutcome, SyncError> {
        self.source.validate_credentials().await.map_err(|e| match e {
            SourceError::Unauthorized => SyncError::Authentication(e),
            other => SyncError::Fetch(other),
        })?;

        let since = self.checkpoint.read()?;
        let candidate = (self.clock)();

        let fetched = self.source.fetch_since(since).await.map_err(SyncError::Fetch)?;
        if !fetched.complete {
            tracing::warn!("highlight fetch was cut short, checkpoint will not advance this run");
        }

        let definitions = extract_definitions(&fetched.batches, self.settings.match_on);
        if definitions.is_empty() {
            if fetched.batches.is_empty() {
                tracing::info!("no new highlights");
            } else {
                tracing::info!(batches = fetched.batches.len(), "no new dictionary definitions");
            }
            let committed = !self.settings.dry_run && self.commit(candidate, fetched.complete)?;
            return Ok(RunOutcome::NothingNew { committed });
        }

        if self.settings.dry_run {
            for def in &definitions {
                tracing::info!(
                    word = %def.word,
                    part_of_speech = %def.part_of_speech,
                    definition = %def.definition,
                    highlight_id = %def.highlight_id,
                    "dry run, would create card"
                );
            }
            return Ok(RunOutcome::DryRun {
                definitions: definitions.len(),
            });
        }

        tracing::info!(count = definitions.len(), "adding definitions to anki");

        self.ensure_target_ready().await?;
        self.ensure_environment().await?;

        let stats = self.create_cards(&definitions).await;
        tracing::info!(
            created = stats.created,
            duplicates = stats.duplicates,
            failed = stats.failed,
            "finished processing definitions"
        );

        let committed = if stats.should_commit() {
            self.commit(candidate, fetched.complete)?
        } else {
            tracing::warn!("no cards were added though definitions were found, checkpoint will not advance");
            false
        };

        Ok(RunOutcome::Completed { stats, committed })
    }

    fn commit(&self, candidate: DateTime<Utc>, complete: bool) -> Result<bool, SyncError> {
        if !complete {
            return Ok(false);
        }
        self.checkpoint.write(candidate)?;
        Ok(true)
    }

    async fn ensure_target_ready(&self) -> Result<(), SyncError> {
        if self.target.is_ready().await {
            tracing::info!("anki is running and ankiconnect is responsive");
            return Ok(());
        }

        tracing::info!("anki is not responsive, attempting to launch it");
        if !self.target.wake().await {
            tracing::error!("failed to launch anki, skipping card creation");
            return Err(SyncError::TargetUnavailable);
        }

        if !self.target.is_ready().await {
            tracing::error!("anki is still not responsive after launch, skipping card creation");
            return Err(SyncError::TargetUnavailable);
        }
        Ok(())
    }

    async fn ensure_environment(&self) -> Result<(), SyncError> {
        let deck = &self.settings.deck;
        let model = &self.settings.model;

        self.target
            .ensure_collection(deck)
            .await
            .map_err(SyncError::Environment)?;

        self.target
            .ensure_template(model, &self.settings.fields)
            .await
            .map_err(|e| {
                if e.is_configuration() {
                    SyncError::Configuration(e)
                } else {
                    SyncError::Environment(e)
                }
            })
    }

    async fn create_cards(&self, definitions: &[DefinitionRecord]) -> SyncStats {
        let mut stats = SyncStats::default();

        for def in definitions {
            self.create_card(def).await.record(&mut stats);
        }

        stats
    }

    async fn create_card(&self, def: &DefinitionRecord) -> SyncResult {
        let card = build_card(def, &self.settings.deck, &self.settings.model, &self.settings.fields);

        match self.target.create_card(&card, self.settings.duplicate_check).await {
            Ok(CardOutcome::Created(id)) => {
                tracing::info!(word = %def.word, note_id = id, "added note to anki");
                SyncResult::Created(id)
            }
            Ok(CardOutcome::Duplicate(existing)) => {
                tracing::info!(word = %def.word, existing = ?existing, "note already in deck, skipping");
                SyncResult::Duplicate
            }
            Err(e) => {
                tracing::warn!(
                    word = %def.word,
                    highlight_id = %def.highlight_id,
                    error = %crate::unpack_error(&e),
                    "could not add note"
                );
                SyncResult::Error
            }
        }
    }
}
