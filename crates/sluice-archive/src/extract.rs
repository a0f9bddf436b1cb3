//! The extraction pipeline.
//!
//! An [`Engine`] pulls entries one at a time from an [`EntrySource`], runs
//! each through the [`EntryFilter`] and the path sanitizer, then copies the
//! bytes through pooled buffers into a [`Sink`]. Between chunks it consults
//! the [`BackpressureController`] and the [`MemoryMonitor`].
//!
//! Per-entry failures become warnings and the entry is skipped. Cancellation,
//! timeouts, memory-limit breaches and archive-level corruption stop the run;
//! the work done so far is returned inside [`Aborted`].

use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use sluice_fs::{FsSink, Sink};
use tracing::{debug, info, warn};

use crate::backpressure::BackpressureController;
use crate::entry::{ArchiveEntry, EntryHeader, EntryKind, EntryOutcome, EntryRecord};
use crate::error::{Aborted, Error, Result};
use crate::events::ExtractionEvent;
use crate::filter::{EntryFilter, RejectReason, Verdict};
use crate::format::{detect_from_reader, ArchiveFormat, TarCompress};
use crate::memory::{
    MemoryLedger, MemoryMonitor, MemorySource, MemorySourceKind, MemoryUsageSnapshot,
};
use crate::options::{ExtractOptions, Progress, Strategy};
use crate::pool::{BufferHandle, BufferPool};
use crate::report::{ExtractionResult, ExtractionStatus, ExtractionWarning};
use crate::sanitize::sanitize_entry_path;
use crate::score::{VerificationReport, VerificationScorer};

#[cfg(feature = "tar")]
mod tar;
#[cfg(feature = "zip")]
mod zip;

#[cfg(feature = "tar")]
pub use tar::{TarArchive, TarSource};
#[cfg(feature = "zip")]
pub use zip::ZipSource;

/// Fixed bytes charged to every run for the orchestrator's own state.
pub const ORCHESTRATION_OVERHEAD: u64 = 64 * 1024;

/// A stream of archive entries, pulled one at a time.
///
/// An `Err` that [`is_fatal`](Error::is_fatal) ends the run; any other error
/// skips one entry and the source is asked for the next.
pub trait EntrySource {
    fn next_entry(&mut self) -> Option<Result<ArchiveEntry<'_>>>;

    fn format(&self) -> Option<ArchiveFormat> {
        None
    }

    /// Sum of declared entry sizes, when known up front.
    fn total_size(&self) -> Option<u64> {
        None
    }
}

/// Builds an [`Engine`] from caller-owned parts.
#[derive(Default)]
pub struct EngineBuilder {
    pool: Option<BufferPool>,
    monitor: Option<MemoryMonitor>,
    controller: Option<BackpressureController>,
    scorer: Option<VerificationScorer>,
    memory_limit: Option<u64>,
    warning_threshold_percent: Option<f64>,
    memory_source: MemorySourceKind,
}

impl EngineBuilder {
    pub fn memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn warning_threshold_percent(mut self, percent: f64) -> Self {
        self.warning_threshold_percent = Some(percent);
        self
    }

    /// Ignored when a monitor is supplied with [`monitor`](Self::monitor).
    pub fn memory_source(mut self, kind: MemorySourceKind) -> Self {
        self.memory_source = kind;
        self
    }

    pub fn pool(mut self, pool: BufferPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn monitor(mut self, monitor: MemoryMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn controller(mut self, controller: BackpressureController) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn scorer(mut self, scorer: VerificationScorer) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn build(self) -> Engine {
        let mut monitor = self.monitor.unwrap_or_else(|| match self.memory_source {
            MemorySourceKind::Ledger => MemoryMonitor::new(MemorySource::Ledger(Arc::new(
                MemoryLedger::new(ORCHESTRATION_OVERHEAD),
            ))),
            MemorySourceKind::Process => MemoryMonitor::process(),
        });
        if let Some(limit) = self.memory_limit {
            monitor = monitor.limit(Some(limit));
        }
        if let Some(percent) = self.warning_threshold_percent {
            monitor = monitor.warning_threshold_percent(percent);
        }

        let ledger = monitor
            .ledger()
            .cloned()
            .unwrap_or_else(|| Arc::new(MemoryLedger::new(ORCHESTRATION_OVERHEAD)));
        let mut pool = self.pool.unwrap_or_default();
        pool.attach_ledger(Arc::clone(&ledger));

        Engine {
            pool,
            monitor,
            controller: self.controller.unwrap_or_default(),
            scorer: self.scorer.unwrap_or_default(),
            ledger,
        }
    }
}

/// Runs extractions. Owns its pool and monitor, so one engine serves one
/// run at a time.
pub struct Engine {
    pool: BufferPool,
    monitor: MemoryMonitor,
    controller: BackpressureController,
    scorer: VerificationScorer,
    ledger: Arc<MemoryLedger>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

struct Copied {
    written: u64,
    digest: Option<String>,
}

impl Engine {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn monitor(&self) -> &MemoryMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut MemoryMonitor {
        &mut self.monitor
    }

    pub fn controller(&self) -> &BackpressureController {
        &self.controller
    }

    pub fn ledger(&self) -> &Arc<MemoryLedger> {
        &self.ledger
    }

    pub fn score(&self, result: &ExtractionResult) -> VerificationReport {
        self.scorer.score(result)
    }

    /// Detect the format from magic bytes and extract into `sink`.
    pub fn extract<R, S>(
        &mut self,
        mut reader: R,
        sink: &mut S,
        options: &ExtractOptions,
    ) -> std::result::Result<ExtractionResult, Aborted>
    where
        R: Read + Seek,
        S: Sink + ?Sized,
    {
        let format = detect_from_reader(&mut reader)
            .map_err(|e| early_abort(Error::Io(e), None))?
            .ok_or_else(|| early_abort(Error::UnsupportedFormat, None))?;
        debug!(?format, "detected archive format");

        match format {
            #[cfg(feature = "zip")]
            ArchiveFormat::Zip => {
                let mut source = ZipSource::new(reader).map_err(|e| early_abort(e, Some(format)))?;
                self.extract_with_source(&mut source, sink, options)
            }
            #[cfg(feature = "tar")]
            ArchiveFormat::Tar(compress) => self.extract_tar_stream(reader, compress, sink, options),
            #[allow(unreachable_patterns)]
            _ => Err(early_abort(Error::UnsupportedFormat, Some(format))),
        }
    }

    /// Extract a tar stream that cannot seek, such as a pipe.
    ///
    /// A tar stream has no index, so the total size is unknown up front and
    /// [`Progress::percentage`] stays `None` unless the caller supplies
    /// [`ExtractOptions::expected_total_bytes`].
    #[cfg(feature = "tar")]
    pub fn extract_tar_stream<R, S>(
        &mut self,
        reader: R,
        compress: TarCompress,
        sink: &mut S,
        options: &ExtractOptions,
    ) -> std::result::Result<ExtractionResult, Aborted>
    where
        R: Read,
        S: Sink + ?Sized,
    {
        let format = Some(ArchiveFormat::Tar(compress));
        let decoder = compress
            .decoder(reader)
            .map_err(|e| early_abort(e, format))?;
        let mut archive = TarArchive::new(decoder, compress);
        let mut source = archive.entries().map_err(|e| early_abort(e, format))?;
        self.extract_with_source(&mut source, sink, options)
    }

    /// Extract from an already-opened source.
    pub fn extract_with_source<E, S>(
        &mut self,
        source: &mut E,
        sink: &mut S,
        options: &ExtractOptions,
    ) -> std::result::Result<ExtractionResult, Aborted>
    where
        E: EntrySource + ?Sized,
        S: Sink + ?Sized,
    {
        let format = source.format();
        let filter = EntryFilter::new(&options.filter).map_err(|e| early_abort(e, format))?;

        let total_bytes = options.expected_total_bytes.or_else(|| source.total_size());
        let mut run = Run::new(options, filter, format, total_bytes);

        let ceiling = self.controller.high_water_mark_ceiling();
        if options.high_water_mark_override.is_some() {
            self.controller
                .set_high_water_mark_override(options.high_water_mark_override);
        }
        self.controller.reset();
        self.ledger.reset_peak();

        info!(
            ?format,
            total_bytes = ?total_bytes,
            limit = ?self.monitor.get_limit(),
            "extraction started"
        );
        run.emit(ExtractionEvent::Started { format, total_bytes });

        let outcome = self.drive(source, sink, &mut run);

        self.ledger.set_staged(0);
        if outcome.is_err() {
            sink.abort();
        }
        self.ledger.set_external(sink.buffered());
        self.controller.set_high_water_mark_override(ceiling);

        let peak = match self.monitor.ledger() {
            Some(ledger) => ledger.peak(),
            None => run.observed_peak,
        };
        let mut result = run.finish(peak);

        match outcome {
            Ok(()) => {
                info!(
                    extracted = result.extracted_count,
                    skipped = result.skipped_count,
                    bytes = result.total_bytes_written,
                    elapsed_ms = result.elapsed.as_millis() as u64,
                    "extraction finished"
                );
                emit(options, ExtractionEvent::Finished {
                    status: result.status,
                    extracted: result.extracted_count,
                    skipped: result.skipped_count,
                });
                Ok(result)
            }
            Err(error) => {
                result.status = status_for(&error);
                warn!(
                    %error,
                    extracted = result.extracted_count,
                    skipped = result.skipped_count,
                    "extraction aborted"
                );
                emit(options, ExtractionEvent::Finished {
                    status: result.status,
                    extracted: result.extracted_count,
                    skipped: result.skipped_count,
                });
                Err(Aborted::new(error, result))
            }
        }
    }

    fn drive<E, S>(&mut self, source: &mut E, sink: &mut S, run: &mut Run<'_>) -> Result<()>
    where
        E: EntrySource + ?Sized,
        S: Sink + ?Sized,
    {
        loop {
            run.checkpoint()?;
            let entry = match source.next_entry() {
                None => return Ok(()),
                Some(Ok(entry)) => entry,
                Some(Err(e)) if e.is_fatal() => return Err(e),
                Some(Err(e)) => {
                    let header = EntryHeader::file(e.entry_path().unwrap_or("<unknown>"), 0);
                    run.fail(&header, e);
                    continue;
                }
            };
            self.process_entry(entry, sink, run)?;
        }
    }

    fn process_entry<S>(
        &mut self,
        entry: ArchiveEntry<'_>,
        sink: &mut S,
        run: &mut Run<'_>,
    ) -> Result<()>
    where
        S: Sink + ?Sized,
    {
        let ArchiveEntry { header, mut reader } = entry;
        debug!(
            entry = %header.name,
            size = header.size,
            kind = %header.kind,
            "processing entry"
        );
        run.emit(ExtractionEvent::EntryStarted {
            name: header.name.clone(),
            size: header.size,
        });

        if let Verdict::Reject(reason) = run.filter.evaluate(&header) {
            run.reject(&header, reason);
            return Ok(());
        }
        if matches!(header.kind, EntryKind::Symlink | EntryKind::Other) {
            run.reject(&header, RejectReason::UnsupportedKind(header.kind));
            return Ok(());
        }

        let relative = match sanitize_entry_path(&header.name, run.options.strip_components) {
            Ok(sanitized) => sanitized.relative,
            Err(Error::NoComponentsRemaining { .. }) => {
                run.reject(&header, RejectReason::Stripped);
                return Ok(());
            }
            Err(Error::UnsafePath { reason, .. }) => {
                run.reject(&header, RejectReason::Unsafe(reason));
                return Ok(());
            }
            Err(e) => {
                run.fail(&header, e);
                return Ok(());
            }
        };

        if header.is_directory() {
            match sink.create_dir(&relative) {
                Ok(()) => {
                    let mut record = EntryRecord::new(&header, EntryOutcome::Extracted);
                    record.target_path = Some(relative);
                    run.record(record);
                }
                Err(e) => run.fail(&header, e.into()),
            }
            return Ok(());
        }

        if !run.options.overwrite_existing && sink.exists(&relative) {
            debug!(entry = %header.name, "keeping existing file");
            let mut record = EntryRecord::new(&header, EntryOutcome::Kept);
            record.target_path = Some(relative);
            run.record(record);
            return Ok(());
        }

        let copied = if self.use_streaming(&header, run) {
            self.stream_entry(&header, &relative, &mut *reader, sink, run)
        } else {
            self.stage_entry(&header, &relative, &mut *reader, sink, run)
        };

        match copied {
            Ok(copied) => {
                if copied.written != header.size {
                    warn!(
                        entry = %header.name,
                        declared = header.size,
                        written = copied.written,
                        "size mismatch"
                    );
                    run.result.warn(ExtractionWarning::for_entry(
                        &header.name,
                        format!("wrote {} of {} declared bytes", copied.written, header.size),
                    ));
                }
                if let Some(mode) = run.options.perm_strategy.resolve(header.mode) {
                    if let Err(e) = sink.set_mode(&relative, mode) {
                        warn!(entry = %header.name, error = %e, "failed to apply permissions");
                        run.result
                            .warn(ExtractionWarning::for_entry(&header.name, e.to_string()));
                    }
                }
                let mut record = EntryRecord::new(&header, EntryOutcome::Extracted);
                record.bytes_written = copied.written;
                record.digest = copied.digest;
                record.target_path = Some(relative);
                run.record(record);
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                sink.abort();
                self.ledger.set_staged(0);
                self.ledger.set_external(sink.buffered());
                run.fail(&header, e);
                Ok(())
            }
        }
    }

    fn use_streaming(&self, header: &EntryHeader, run: &mut Run<'_>) -> bool {
        let threshold = run.options.streaming_threshold;
        let fits = || {
            self.monitor.get_limit().is_none_or(|limit| {
                self.monitor
                    .current_usage()
                    .heap_used
                    .saturating_add(header.size)
                    < limit
            })
        };
        match run.options.strategy {
            Strategy::Streaming => true,
            Strategy::Auto => {
                header.size > threshold
                    || run.total_bytes.is_some_and(|total| total > threshold)
                    || !fits()
            }
            Strategy::Standard => {
                let fits = fits();
                if !fits {
                    warn!(
                        entry = %header.name,
                        size = header.size,
                        "entry does not fit in memory, streaming it"
                    );
                    run.result.warn(ExtractionWarning::for_entry(
                        &header.name,
                        "entry does not fit in the memory budget; streamed instead of staged",
                    ));
                }
                !fits
            }
        }
    }

    /// Most bytes an entry may produce: its declared size, and never more
    /// than the configured maximum.
    fn byte_cap(header: &EntryHeader, run: &Run<'_>) -> u64 {
        header.size.min(run.filter.max_size().unwrap_or(u64::MAX))
    }

    fn stream_entry<R, S>(
        &mut self,
        header: &EntryHeader,
        path: &Path,
        reader: &mut R,
        sink: &mut S,
        run: &mut Run<'_>,
    ) -> Result<Copied>
    where
        R: Read + ?Sized,
        S: Sink + ?Sized,
    {
        sink.begin(path, run.options.overwrite_existing)?;
        let cap = Self::byte_cap(header, run);
        let mut hasher = run.options.hash_strategy.hasher();
        let mut read = 0u64;

        loop {
            run.checkpoint()?;
            let started = Instant::now();
            let handle = self.acquire(header.size.saturating_sub(read), sink, run)?;
            let n = match read_chunk(self.pool.buf_mut(&handle), reader, &header.name) {
                Ok(n) => n,
                Err(e) => {
                    self.pool.release(handle);
                    return Err(e);
                }
            };
            if n == 0 {
                self.pool.release(handle);
                break;
            }
            read += n as u64;
            if read > cap {
                self.pool.release(handle);
                return Err(too_large(header, read, cap));
            }

            let chunk = &self.pool.buf(&handle)[..n];
            if let Some(hasher) = hasher.as_mut() {
                hasher.update(chunk);
            }
            let wrote = sink.write(chunk);
            self.pool.release(handle);
            wrote?;

            self.controller.record(1, started.elapsed());
            let buffered = sink.buffered();
            self.ledger.set_external(buffered);
            if self.controller.should_pause(buffered) {
                self.pause(sink, run)?;
            }
        }

        let written = sink.finish()?;
        self.ledger.set_external(sink.buffered());
        Ok(Copied {
            written,
            digest: hasher.map(|h| h.finalize()),
        })
    }

    fn stage_entry<R, S>(
        &mut self,
        header: &EntryHeader,
        path: &Path,
        reader: &mut R,
        sink: &mut S,
        run: &mut Run<'_>,
    ) -> Result<Copied>
    where
        R: Read + ?Sized,
        S: Sink + ?Sized,
    {
        let cap = Self::byte_cap(header, run);
        // Declared sizes are untrusted; grow past the threshold only as bytes arrive.
        let mut staged: Vec<u8> =
            Vec::with_capacity(cap.min(run.options.streaming_threshold) as usize);
        self.ledger.set_staged(staged.capacity() as u64);

        loop {
            run.checkpoint()?;
            let started = Instant::now();
            let remaining = header.size.saturating_sub(staged.len() as u64);
            let handle = self.acquire(remaining, sink, run)?;
            let n = match read_chunk(self.pool.buf_mut(&handle), reader, &header.name) {
                Ok(n) => n,
                Err(e) => {
                    self.pool.release(handle);
                    return Err(e);
                }
            };
            if n == 0 {
                self.pool.release(handle);
                break;
            }
            if (staged.len() + n) as u64 > cap {
                self.pool.release(handle);
                return Err(too_large(header, (staged.len() + n) as u64, cap));
            }
            if staged.len() + n > staged.capacity() {
                // Double, but never past the cap; the allocation is what the ledger charges.
                let target = (staged.capacity() * 2)
                    .max(staged.len() + n)
                    .min(cap as usize);
                staged.reserve_exact(target - staged.len());
            }
            staged.extend_from_slice(&self.pool.buf(&handle)[..n]);
            self.pool.release(handle);
            self.ledger.set_staged(staged.capacity() as u64);
            self.controller.record(1, started.elapsed());
        }

        let digest = run.options.hash_strategy.compute_from_bytes(&staged);
        sink.begin(path, run.options.overwrite_existing)?;
        sink.write(&staged)?;
        self.ledger.set_external(sink.buffered());
        let written = sink.finish()?;
        self.ledger.set_staged(0);
        self.ledger.set_external(sink.buffered());
        Ok(Copied { written, digest })
    }

    /// Check out a buffer for the next chunk, shedding load first when the
    /// chunk would push accounted memory past the limit.
    fn acquire<S>(
        &mut self,
        remaining: u64,
        sink: &mut S,
        run: &mut Run<'_>,
    ) -> Result<BufferHandle>
    where
        S: Sink + ?Sized,
    {
        self.ledger.set_external(sink.buffered());
        let usage = self.observe(run);
        let mut class = self.controller.buffer_class_for(remaining);

        if let Some(limit) = self.monitor.get_limit() {
            if usage.heap_used.saturating_add(class.size() as u64) > limit {
                let freed = self.pool.shrink();
                debug!(
                    heap_used = usage.heap_used,
                    limit, freed, "near memory limit, shedding load"
                );
                self.pause(sink, run)?;

                let usage = self.observe(run);
                while usage.heap_used.saturating_add(class.size() as u64) > limit {
                    match class.smaller() {
                        Some(smaller) => class = smaller,
                        None => break,
                    }
                }
                if self.monitor.exceeds_limit(&usage) {
                    return Err(Error::MemoryLimitExceeded {
                        used: usage.heap_used,
                        limit,
                    });
                }
            }
        }

        Ok(self.pool.acquire(class))
    }

    fn observe(&mut self, run: &mut Run<'_>) -> MemoryUsageSnapshot {
        let usage = self.monitor.current_usage();
        let percentage = self.monitor.percentage_of(&usage);
        self.controller.observe_memory(usage, percentage);
        run.observed_peak = run.observed_peak.max(usage.heap_used);

        if self.monitor.alert_on(&usage) {
            warn!(
                heap_used = usage.heap_used,
                percentage, "memory usage crossed the warning threshold"
            );
            run.emit(ExtractionEvent::MemoryWarning { usage, percentage });
        }
        usage
    }

    /// Drain the sink; wait out the pause delay only if that did not bring
    /// the buffered bytes back under the mark.
    fn pause<S>(&mut self, sink: &mut S, run: &mut Run<'_>) -> Result<()>
    where
        S: Sink + ?Sized,
    {
        let buffered = sink.buffered();
        let high_water_mark = self.controller.adaptive_high_water_mark();
        let delay = self.controller.pause_delay(buffered);
        let started = Instant::now();
        debug!(buffered, high_water_mark, delay_ms = delay.as_millis() as u64, "pausing producer");
        run.emit(ExtractionEvent::Paused {
            buffered,
            high_water_mark,
            delay,
        });

        sink.drain()?;
        if sink.buffered() > high_water_mark {
            let delay = match run.deadline {
                Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
                None => delay,
            };
            thread::sleep(delay);
        }

        self.ledger.set_external(sink.buffered());
        run.result.pause_count += 1;
        run.result.total_pause += started.elapsed();
        run.checkpoint()
    }
}

/// State of one run.
struct Run<'o> {
    options: &'o ExtractOptions,
    filter: EntryFilter,
    result: ExtractionResult,
    started: Instant,
    deadline: Option<Instant>,
    total_bytes: Option<u64>,
    processed: u64,
    observed_peak: u64,
}

impl<'o> Run<'o> {
    fn new(
        options: &'o ExtractOptions,
        filter: EntryFilter,
        format: Option<ArchiveFormat>,
        total_bytes: Option<u64>,
    ) -> Self {
        let started = Instant::now();
        Self {
            options,
            filter,
            result: ExtractionResult {
                format,
                ..Default::default()
            },
            started,
            deadline: options.timeout.map(|t| started + t),
            total_bytes,
            processed: 0,
            observed_peak: 0,
        }
    }

    fn checkpoint(&self) -> Result<()> {
        if self.options.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let (Some(deadline), Some(after)) = (self.deadline, self.options.timeout) {
            if Instant::now() >= deadline {
                return Err(Error::Timeout { after });
            }
        }
        Ok(())
    }

    fn emit(&self, event: ExtractionEvent) {
        emit(self.options, event);
    }

    fn reject(&mut self, header: &EntryHeader, reason: RejectReason) {
        match &reason {
            RejectReason::TooLarge { size, max } => {
                let error = too_large(header, *size, *max);
                debug!(entry = %header.name, %reason, "entry filtered");
                self.result
                    .warn(ExtractionWarning::for_entry(&header.name, error.to_string()));
            }
            RejectReason::UnsupportedKind(_) => {
                warn!(entry = %header.name, %reason, "skipping entry");
                self.result
                    .warn(ExtractionWarning::for_entry(&header.name, reason.to_string()));
            }
            RejectReason::Unsafe(_) => {
                warn!(entry = %header.name, %reason, "rejected unsafe entry");
                self.result
                    .warn(ExtractionWarning::for_entry(&header.name, reason.to_string()));
            }
            _ => debug!(entry = %header.name, %reason, "entry filtered"),
        }
        self.record(EntryRecord::new(header, EntryOutcome::Filtered(reason)));
    }

    fn fail(&mut self, header: &EntryHeader, error: Error) {
        warn!(entry = %header.name, %error, "skipping entry");
        self.result
            .warn(ExtractionWarning::for_entry(&header.name, error.to_string()));
        self.record(EntryRecord::new(header, EntryOutcome::Failed(error.to_string())));
    }

    fn record(&mut self, record: EntryRecord) {
        match &record.outcome {
            EntryOutcome::Extracted => {
                if let Some(callback) = &self.options.on_entry_extracted {
                    callback(&record);
                }
                self.emit(ExtractionEvent::EntryExtracted {
                    name: record.name.clone(),
                    bytes_written: record.bytes_written,
                });
            }
            EntryOutcome::Filtered(reason) => self.emit(ExtractionEvent::EntrySkipped {
                name: record.name.clone(),
                reason: reason.to_string(),
            }),
            EntryOutcome::Kept => self.emit(ExtractionEvent::EntrySkipped {
                name: record.name.clone(),
                reason: "destination already exists".to_string(),
            }),
            EntryOutcome::Failed(message) => self.emit(ExtractionEvent::EntrySkipped {
                name: record.name.clone(),
                reason: message.clone(),
            }),
        }

        self.processed += record.declared_size;
        let current_file = record.target_path.clone();
        self.result.push(record);
        self.progress(current_file);
    }

    fn progress(&self, current_file: Option<PathBuf>) {
        let progress = Progress {
            bytes_processed: self.processed,
            total_bytes: self.total_bytes,
            entries_processed: self.result.entries.len(),
            current_file,
        };
        self.emit(ExtractionEvent::Progress {
            bytes_processed: progress.bytes_processed,
            percentage: progress.percentage(),
        });
        if let Some(callback) = &self.options.on_progress {
            callback(progress);
        }
    }

    fn finish(mut self, peak_memory: u64) -> ExtractionResult {
        self.result.elapsed = self.started.elapsed();
        self.result.peak_memory = peak_memory;
        self.result
    }
}

fn emit(options: &ExtractOptions, event: ExtractionEvent) {
    if let Some(events) = &options.events {
        events.emit(event);
    }
}

fn read_chunk<R: Read + ?Sized>(buf: &mut [u8], reader: &mut R, name: &str) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(Error::StreamFailure {
                    path: name.to_string(),
                    source: e,
                });
            }
        }
    }
}

fn too_large(header: &EntryHeader, size: u64, limit: u64) -> Error {
    Error::EntryTooLarge {
        path: header.name.clone(),
        size,
        limit,
    }
}

fn status_for(error: &Error) -> ExtractionStatus {
    match error {
        Error::Cancelled => ExtractionStatus::Cancelled,
        Error::Timeout { .. } => ExtractionStatus::TimedOut,
        _ => ExtractionStatus::Aborted,
    }
}

/// An abort before any entry was read.
fn early_abort(error: Error, format: Option<ArchiveFormat>) -> Aborted {
    let partial = ExtractionResult {
        status: status_for(&error),
        format,
        ..Default::default()
    };
    Aborted::new(error, partial)
}

/// Extract an archive into `destination` with a default [`Engine`].
pub fn extract_from_reader<R: Read + Seek>(
    reader: R,
    destination: impl AsRef<Path>,
    options: &ExtractOptions,
) -> std::result::Result<ExtractionResult, Aborted> {
    let mut sink = FsSink::new(destination).map_err(|e| early_abort(e.into(), None))?;
    Engine::new().extract(reader, &mut sink, options)
}
