//! Per-engine statistics collection and reporting.
//!
//! Each engine owns one of these counter structures and exposes it through a
//! `stats()` accessor; the host may print it at end-of-run. Counters are the
//! only user-visible surface of the engines besides the prefetches
//! themselves.

/// IPCP counters, broken down by prefetch class.
#[derive(Clone, Copy, Debug, Default)]
pub struct IpcpStats {
    /// Prefetches issued by the stream class.
    pub stream_issued: u64,
    /// Prefetches issued by the constant-stride class.
    pub const_stride_issued: u64,
    /// Prefetches issued by the complex-stride class.
    pub complex_issued: u64,
    /// Prefetches issued by the next-line classes (new-IP and speculative).
    pub next_line_issued: u64,
    /// Demand misses observed.
    pub misses_observed: u64,
    /// Speculative next-line re-evaluations performed.
    pub spec_nl_flips: u64,
}

impl IpcpStats {
    /// Prints the counters to stdout, one `name value` line per counter.
    pub fn print(&self) {
        println!("ipcp.pref.stream        {}", self.stream_issued);
        println!("ipcp.pref.const_stride  {}", self.const_stride_issued);
        println!("ipcp.pref.complex       {}", self.complex_issued);
        println!("ipcp.pref.next_line     {}", self.next_line_issued);
        println!("ipcp.misses             {}", self.misses_observed);
        println!("ipcp.spec_nl_evals      {}", self.spec_nl_flips);
    }
}

/// Per-table lookup/hit/insert/evict counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableStats {
    /// Lookups performed.
    pub lookup: u64,
    /// Lookups that hit.
    pub hit: u64,
    /// Entries inserted.
    pub insert: u64,
    /// Entries evicted.
    pub evict: u64,
}

/// SMS counters across its three tables and the prefetch buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SmsStats {
    /// Filter table activity.
    pub ft: TableStats,
    /// Accumulation table activity.
    pub at: TableStats,
    /// Pattern history table activity.
    pub pht: TableStats,
    /// Prefetch candidates generated from PHT patterns.
    pub generated: u64,
    /// Candidates accepted into the prefetch buffer.
    pub buffered: u64,
    /// Candidates dropped because the buffer was full.
    pub spilled: u64,
    /// Prefetches issued from the buffer.
    pub issued: u64,
}

impl SmsStats {
    /// Prints the counters to stdout.
    pub fn print(&self) {
        let table = |name: &str, t: &TableStats| {
            println!(
                "sms.{name}  lookups: {:<10} | hits: {:<10} | inserts: {:<10} | evicts: {}",
                t.lookup, t.hit, t.insert, t.evict
            );
        };
        table("ft ", &self.ft);
        table("at ", &self.at);
        table("pht", &self.pht);
        println!("sms.pref.generated      {}", self.generated);
        println!("sms.pref.buffered       {}", self.buffered);
        println!("sms.pref.spilled        {}", self.spilled);
        println!("sms.pref.issued         {}", self.issued);
    }
}

/// Berti counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct BertiStats {
    /// Single best-delta prefetches issued.
    pub delta_issued: u64,
    /// Prefetches issued inside bursts.
    pub burst_issued: u64,
    /// Bursts cut short by back-pressure (bookmark saved).
    pub burst_bookmarked: u64,
    /// Candidate deltas ratified into current pages.
    pub candidates_added: u64,
    /// Pages archived into the record table.
    pub pages_recorded: u64,
    /// Current-page allocations.
    pub pages_allocated: u64,
}

impl BertiStats {
    /// Prints the counters to stdout.
    pub fn print(&self) {
        println!("berti.pref.delta        {}", self.delta_issued);
        println!("berti.pref.burst        {}", self.burst_issued);
        println!("berti.burst.bookmarked  {}", self.burst_bookmarked);
        println!("berti.candidates.added  {}", self.candidates_added);
        println!("berti.pages.recorded    {}", self.pages_recorded);
        println!("berti.pages.allocated   {}", self.pages_allocated);
    }
}

/// SPP+PPF counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct SppStats {
    /// Prefetches issued toward L2.
    pub l2_issued: u64,
    /// Prefetches issued toward the LLC only.
    pub llc_issued: u64,
    /// Candidates rejected by the perceptron.
    pub perc_rejected: u64,
    /// Candidates deduplicated by the prefetch filter.
    pub filter_dropped: u64,
    /// Lookahead steps taken beyond depth 0.
    pub lookahead_steps: u64,
    /// Cross-page candidates parked in the carry register.
    pub ghr_carries: u64,
}

impl SppStats {
    /// Prints the counters to stdout.
    pub fn print(&self) {
        println!("spp.pref.l2             {}", self.l2_issued);
        println!("spp.pref.llc            {}", self.llc_issued);
        println!("spp.perc.rejected       {}", self.perc_rejected);
        println!("spp.filter.dropped      {}", self.filter_dropped);
        println!("spp.lookahead.steps     {}", self.lookahead_steps);
        println!("spp.ghr.carries         {}", self.ghr_carries);
    }
}

/// Pythia counters, grouped by pipeline stage.
#[derive(Clone, Debug, Default)]
pub struct PythiaStats {
    /// Signature table activity.
    pub st: TableStats,
    /// Prediction-path counters.
    pub predict: PythiaPredictStats,
    /// Tracker counters.
    pub track: PythiaTrackStats,
    /// Reward counters, one per reward type.
    pub reward: PythiaRewardStats,
    /// SARSA training invocations.
    pub train_called: u64,
    /// Fill notifications that matched a tracked prefetch.
    pub fill_matched: u64,
}

/// Pythia prediction-path counters.
#[derive(Clone, Debug, Default)]
pub struct PythiaPredictStats {
    /// Predictions requested.
    pub called: u64,
    /// Predictions whose offset fell outside the page.
    pub out_of_bounds: u64,
    /// Prefetch addresses generated (including multi-degree extras).
    pub issued: u64,
    /// Extra prefetches generated by degrees above 1.
    pub multi_degree: u64,
    /// Times each action index was selected.
    pub action_dist: Vec<u64>,
}

/// Pythia tracker counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct PythiaTrackStats {
    /// Tracker insertions attempted.
    pub called: u64,
    /// Predictions suppressed because the address was already tracked.
    pub same_address: u64,
    /// Tracker evictions.
    pub evict: u64,
}

/// Reward-type counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct PythiaRewardStats {
    /// Demand hit a filled prefetch.
    pub correct_timely: u64,
    /// Demand hit an in-flight prefetch.
    pub correct_untimely: u64,
    /// Prefetch evicted without reuse.
    pub incorrect: u64,
    /// No-prefetch decision evicted without demand.
    pub none: u64,
    /// Prediction left the page.
    pub out_of_bounds: u64,
    /// Prediction re-chose a tracked address.
    pub tracker_hit: u64,
}

impl PythiaStats {
    /// Prints the counters to stdout.
    pub fn print(&self) {
        println!("pythia.st.lookup        {}", self.st.lookup);
        println!("pythia.st.hit           {}", self.st.hit);
        println!("pythia.st.insert        {}", self.st.insert);
        println!("pythia.st.evict         {}", self.st.evict);
        println!("pythia.predict.called   {}", self.predict.called);
        println!("pythia.predict.oob      {}", self.predict.out_of_bounds);
        println!("pythia.predict.issued   {}", self.predict.issued);
        println!("pythia.predict.multi    {}", self.predict.multi_degree);
        for (index, count) in self.predict.action_dist.iter().enumerate() {
            println!("pythia.action.index_{index} {count}");
        }
        println!("pythia.track.called     {}", self.track.called);
        println!("pythia.track.same_addr  {}", self.track.same_address);
        println!("pythia.track.evict      {}", self.track.evict);
        println!("pythia.reward.timely    {}", self.reward.correct_timely);
        println!("pythia.reward.untimely  {}", self.reward.correct_untimely);
        println!("pythia.reward.incorrect {}", self.reward.incorrect);
        println!("pythia.reward.none      {}", self.reward.none);
        println!("pythia.reward.oob       {}", self.reward.out_of_bounds);
        println!("pythia.reward.tracker   {}", self.reward.tracker_hit);
        println!("pythia.train.called     {}", self.train_called);
        println!("pythia.fill.matched     {}", self.fill_matched);
    }
}
