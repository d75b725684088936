//! GC Trace Aggregation
//!
//! Parses name-value GC trace lines from a worker child's stdout into
//! events and aggregates them into the counters attached to the result
//! record. Lines that do not parse are dropped individually; the stream
//! keeps flowing.
//!
//! A line is a GC event when it contains a `pause=<float>` and a
//! `gc=<code>` field, e.g. the V8 style:
//!
//! ```text
//! [pid:0x..:0] 9 ms: pause=0.5 mutator=0.1 gc=s allocated=293224 ...
//! ```

use pulsebench_ipc::GcStats;

/// Collection type parsed from the `gc=` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcType {
    /// Young-generation scavenge (`s`, `scavenge`)
    Scavenge,
    /// Full mark-compact (`mc`, `ms`, `mark-compact`)
    MarkCompact,
    /// Minor mark-sweep (`mmc`, `minor-mc`, `minor-ms`)
    MinorMs,
    /// Recognized `gc=` field with an unknown code
    Unknown,
}

impl GcType {
    fn from_code(code: &str) -> Self {
        match code {
            "s" | "scavenge" => GcType::Scavenge,
            "mc" | "ms" | "mark-compact" => GcType::MarkCompact,
            "mmc" | "minor-mc" | "minor-ms" => GcType::MinorMs,
            _ => GcType::Unknown,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GcType::Scavenge => "s",
            GcType::MarkCompact => "mc",
            GcType::MinorMs => "minor-ms",
            GcType::Unknown => "unknown",
        }
    }
}

/// One parsed GC trace event.
#[derive(Debug, Clone, PartialEq)]
pub struct GcEvent {
    /// Collection type
    pub gc_type: GcType,
    /// Pause length in ms
    pub pause_ms: f64,
    /// Bytes allocated since the previous event; `None` when the line
    /// carried no `allocated=` field
    pub allocated: Option<u64>,
    /// Bytes promoted to the old generation
    pub promoted: u64,
    /// Bytes surviving in new space (`new_space_survived`, falling back
    /// to `survived`)
    pub survived: u64,
    /// Object size before the collection
    pub start_object_size: u64,
    /// Object size after the collection
    pub end_object_size: u64,
}

impl GcEvent {
    /// Bytes reclaimed: `max(0, start − end)`.
    pub fn collected(&self) -> u64 {
        self.start_object_size.saturating_sub(self.end_object_size)
    }
}

fn parse_u64(value: &str) -> u64 {
    value
        .parse::<u64>()
        .or_else(|_| value.parse::<f64>().map(|f| f.max(0.0) as u64))
        .unwrap_or(0)
}

/// Parse one stdout line into a GC event.
///
/// Returns `None` for any line without a `pause=` field, with an
/// unparseable pause value, or without a `gc=` field.
pub fn parse_gc_line(line: &str) -> Option<GcEvent> {
    let mut pause_ms: Option<f64> = None;
    let mut gc_code: Option<&str> = None;
    let mut allocated: Option<u64> = None;
    let mut promoted: u64 = 0;
    let mut new_space_survived: Option<u64> = None;
    let mut survived: Option<u64> = None;
    let mut start_object_size: u64 = 0;
    let mut end_object_size: u64 = 0;

    for token in line.split_whitespace() {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "pause" => pause_ms = value.parse::<f64>().ok(),
            "gc" => gc_code = Some(value),
            "allocated" => allocated = Some(parse_u64(value)),
            "promoted" => promoted = parse_u64(value),
            "new_space_survived" => new_space_survived = Some(parse_u64(value)),
            "survived" => survived = Some(parse_u64(value)),
            "start_object_size" => start_object_size = parse_u64(value),
            "end_object_size" => end_object_size = parse_u64(value),
            _ => {}
        }
    }

    // A valid pause and a gc code are what make a line an event; `pause=x`
    // with a bad number is as dead as no pause at all.
    let pause_ms = pause_ms.filter(|p| p.is_finite())?;
    let gc_type = GcType::from_code(gc_code?);

    Some(GcEvent {
        gc_type,
        pause_ms,
        allocated,
        promoted,
        survived: new_space_survived.or(survived).unwrap_or(0),
        start_object_size,
        end_object_size,
    })
}

/// Render an event back into a conforming trace line. Embedding runtimes
/// can emit these to feed the aggregator; `parse_gc_line` recovers the
/// recognized fields exactly.
pub fn render_gc_line(event: &GcEvent) -> String {
    let mut line = format!("pause={} gc={}", event.pause_ms, event.gc_type.code());
    if let Some(allocated) = event.allocated {
        line.push_str(&format!(" allocated={allocated}"));
    }
    line.push_str(&format!(
        " promoted={} new_space_survived={} start_object_size={} end_object_size={}",
        event.promoted, event.survived, event.start_object_size, event.end_object_size
    ));
    line
}

/// Fold events into the counters shipped on the result record.
///
/// Young-generation collections (scavenge, minor-ms) count as scavenges.
/// The byte trio is present iff any event carried `allocated`.
pub fn aggregate_gc_stats(events: &[GcEvent]) -> GcStats {
    let mut stats = GcStats::default();
    let mut any_allocated = false;
    let mut allocated_sum: u64 = 0;
    let mut promoted_sum: u64 = 0;
    let mut survived_sum: u64 = 0;

    for event in events {
        match event.gc_type {
            GcType::Scavenge | GcType::MinorMs => stats.scavenges += 1,
            GcType::MarkCompact => stats.mark_compacts += 1,
            GcType::Unknown => {}
        }
        stats.total_collected += event.collected();
        stats.gc_pause_time += event.pause_ms;

        if let Some(allocated) = event.allocated {
            any_allocated = true;
            allocated_sum += allocated;
        }
        promoted_sum += event.promoted;
        survived_sum += event.survived;
    }

    if any_allocated {
        stats.total_allocated = Some(allocated_sum);
        stats.total_promoted = Some(promoted_sum);
        stats.total_survived = Some(survived_sum);
    }

    stats
}
