// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 多目标跟踪 (贪心最近质心匹配)
//! Greedy nearest-centroid multi-object tracker
//!
//! 每个检测按输入顺序依次匹配距离最近的活跃轨迹, 而不是全局最优分配 (匈牙利算法)。
//! 较早的检测可能抢占一条对后续检测更近的轨迹, 这是有意保留的行为。
//!
//! 生命周期: 新建 → 活跃 (每次匹配刷新) → 超时失活。失活轨迹不再参与匹配,
//! 同一目标再次出现时分配新ID。

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{BBox, Detection, TrackPoint};

/// 跟踪器参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// 最大匹配距离 (像素)
    pub max_distance: f32,
    /// 失活超时 (秒)
    pub timeout_secs: f64,
    /// 轨迹历史长度
    pub history_len: usize,
    /// 失活轨迹保留时长 = timeout × retention_factor, 0 表示永久保留
    pub retention_factor: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 100.0,
            timeout_secs: 2.0,
            history_len: 30,
            retention_factor: 5.0,
        }
    }
}

/// 秒数 → Duration, 负数取 0, 超出范围取 Duration::MAX
fn clamp_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

impl TrackerConfig {
    pub fn timeout(&self) -> Duration {
        clamp_secs(self.timeout_secs)
    }

    /// 失活轨迹的保留窗口, None = 不清理
    pub fn retention(&self) -> Option<Duration> {
        if self.retention_factor <= 0.0 {
            None
        } else {
            Some(clamp_secs(self.timeout_secs.max(0.0) * self.retention_factor))
        }
    }
}

/// 跟踪对象
#[derive(Clone, Debug)]
pub struct Track {
    id: u64,
    bbox: BBox,
    centroid: TrackPoint,
    class_id: usize,
    class_name: String,
    confidence: f32,
    last_seen: Instant,
    active: bool,
    history: VecDeque<TrackPoint>,
    capacity: usize,
}

impl Track {
    fn new(id: u64, det: &Detection, now: Instant, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let centroid = det.centroid();
        let mut history = VecDeque::with_capacity(capacity);
        history.push_back(centroid);
        Self {
            id,
            bbox: det.bbox,
            centroid,
            class_id: det.class_id,
            class_name: det.class_name.clone(),
            confidence: det.confidence,
            last_seen: now,
            active: true,
            history,
            capacity,
        }
    }

    /// 用匹配到的检测原地更新
    fn apply(&mut self, det: &Detection, now: Instant) {
        self.bbox = det.bbox;
        self.centroid = det.centroid();
        self.class_id = det.class_id;
        self.class_name.clone_from(&det.class_name);
        self.confidence = det.confidence;
        self.last_seen = now;

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(self.centroid);
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn centroid(&self) -> TrackPoint {
        self.centroid
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// 质心历史, 从旧到新
    pub fn history(&self) -> &VecDeque<TrackPoint> {
        &self.history
    }
}

/// 轨迹表 (ID → 轨迹), 按ID升序
pub type TrackTable = BTreeMap<u64, Track>;

/// 质心跟踪器
#[derive(Debug)]
pub struct CentroidTracker {
    tracks: TrackTable,
    next_id: u64,
    config: TrackerConfig,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl CentroidTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: TrackTable::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 处理一帧检测, 返回完整轨迹表 (含失活轨迹)
    pub fn update(&mut self, detections: &[Detection], now: Instant) -> &TrackTable {
        // 本周期已更新/新建的轨迹
        let mut claimed: HashSet<u64> = HashSet::with_capacity(detections.len());

        for det in detections {
            if !det.bbox.is_finite() {
                debug!("⚠️ 忽略非法检测框: {:?}", det.bbox);
                continue;
            }
            let centroid = det.centroid();
            match self.nearest_active(&centroid, &claimed) {
                Some(id) => {
                    if let Some(track) = self.tracks.get_mut(&id) {
                        track.apply(det, now);
                    }
                    claimed.insert(id);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    self.tracks
                        .insert(id, Track::new(id, det, now, self.config.history_len));
                    claimed.insert(id);
                    debug!("🆕 新轨迹 #{} ({})", id, det.class_name);
                }
            }
        }

        let timeout = self.config.timeout();
        for track in self.tracks.values_mut() {
            if track.active
                && !claimed.contains(&track.id)
                && now.saturating_duration_since(track.last_seen) > timeout
            {
                track.active = false;
                debug!("💤 轨迹 #{} 超时失活", track.id);
            }
        }

        &self.tracks
    }

    /// 最近的可匹配活跃轨迹 (距离相同时取较小ID)
    fn nearest_active(&self, centroid: &TrackPoint, claimed: &HashSet<u64>) -> Option<u64> {
        let mut best: Option<(u64, f32)> = None;
        for track in self.tracks.values() {
            if !track.active || claimed.contains(&track.id) {
                continue;
            }
            let distance = track.centroid.distance(centroid);
            // NaN 距离或阈值一律视为不匹配
            if distance.partial_cmp(&self.config.max_distance) != Some(Ordering::Less) {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((track.id, distance));
            }
        }
        best.map(|(id, _)| id)
    }

    /// 清理超过保留窗口的失活轨迹, 返回清理数量 (ID不会复用)
    pub fn evict_stale(&mut self, now: Instant) -> usize {
        let Some(retention) = self.config.retention() else {
            return 0;
        };
        let before = self.tracks.len();
        self.tracks
            .retain(|_, t| t.active || now.saturating_duration_since(t.last_seen) <= retention);
        before - self.tracks.len()
    }

    pub fn tracks(&self) -> &TrackTable {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// 已分配的轨迹ID数 (清理不影响)
    pub fn issued_count(&self) -> u64 {
        self.next_id - 1
    }

    pub fn active_count(&self) -> usize {
        self.tracks.values().filter(|t| t.active).count()
    }

    /// 清空轨迹表, ID 从 1 重新开始
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// 以质心构造检测
    fn det_at(cx: f32, cy: f32) -> Detection {
        Detection::new(BBox::new(cx - 25.0, cy - 25.0, 50.0, 50.0), 0.8, 0, "person")
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_empty_update_creates_nothing() {
        let mut tracker = CentroidTracker::default();
        let tracks = tracker.update(&[], Instant::now());
        assert!(tracks.is_empty());
        assert_eq!(tracker.track_count(), 0);
    }

    #[test]
    fn test_lifecycle_scenario() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();

        let tracks = tracker.update(&[det_at(100.0, 100.0)], t0);
        assert_eq!(tracks.len(), 1);
        assert!(tracks.contains_key(&1));

        let tracks = tracker.update(&[det_at(105.0, 102.0)], t0 + secs(0.1));
        assert_eq!(tracks.len(), 1);
        let t1 = &tracks[&1];
        assert!(t1.is_active());
        assert_eq!(t1.centroid(), TrackPoint::new(105.0, 102.0));
        assert_eq!(t1.history().len(), 2);

        let tracks = tracker.update(&[], t0 + secs(3.1));
        assert_eq!(tracks.len(), 1);
        assert!(!tracks[&1].is_active());

        let tracks = tracker.update(&[det_at(105.0, 102.0)], t0 + secs(3.2));
        assert_eq!(tracks.len(), 2);
        assert!(!tracks[&1].is_active());
        assert!(tracks[&2].is_active());
    }

    #[test]
    fn test_timeout_is_strict() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();
        tracker.update(&[det_at(10.0, 10.0)], t0);

        tracker.update(&[], t0 + secs(2.0));
        assert!(tracker.tracks()[&1].is_active());

        tracker.update(&[], t0 + secs(2.01));
        assert!(!tracker.tracks()[&1].is_active());
    }

    #[test]
    fn test_distance_threshold() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();
        tracker.update(&[det_at(0.0, 0.0)], t0);
        // 距离恰好 100 不匹配
        tracker.update(&[det_at(100.0, 0.0)], t0 + secs(0.1));
        assert_eq!(tracker.track_count(), 2);
        assert_eq!(tracker.tracks()[&1].centroid(), TrackPoint::new(0.0, 0.0));
    }

    #[test]
    fn test_one_update_per_cycle() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();
        tracker.update(&[det_at(50.0, 50.0)], t0);

        let tracks = tracker.update(&[det_at(52.0, 50.0), det_at(48.0, 50.0)], t0 + secs(0.1));
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[&1].centroid(), TrackPoint::new(52.0, 50.0));
        assert_eq!(tracks[&2].centroid(), TrackPoint::new(48.0, 50.0));
        assert_eq!(tracks[&1].history().len(), 2);
    }

    #[test]
    fn test_greedy_order_dependence() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();
        tracker.update(&[det_at(0.0, 0.0), det_at(50.0, 0.0)], t0);

        // 第一个检测离 #2 更近 (20 vs 30), 抢占 #2; 第二个检测只能匹配 #1
        let tracks = tracker.update(&[det_at(30.0, 0.0), det_at(45.0, 0.0)], t0 + secs(0.1));
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[&2].centroid(), TrackPoint::new(30.0, 0.0));
        assert_eq!(tracks[&1].centroid(), TrackPoint::new(45.0, 0.0));
    }

    #[test]
    fn test_history_fifo() {
        let config = TrackerConfig {
            history_len: 5,
            ..Default::default()
        };
        let mut tracker = CentroidTracker::new(config);
        let t0 = Instant::now();
        for i in 0..12 {
            tracker.update(&[det_at(i as f32, 0.0)], t0 + secs(i as f64 * 0.01));
        }
        let history = tracker.tracks()[&1].history();
        assert_eq!(history.len(), 5);
        let xs: Vec<f32> = history.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![7.0, 8.0, 9.0, 10.0, 11.0]);
    }

    #[test]
    fn test_evict_stale_keeps_ids_unique() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();
        tracker.update(&[det_at(10.0, 10.0)], t0);
        tracker.update(&[], t0 + secs(3.0));
        assert_eq!(tracker.evict_stale(t0 + secs(5.0)), 0);
        assert_eq!(tracker.evict_stale(t0 + secs(11.0)), 1);
        assert_eq!(tracker.track_count(), 0);

        let tracks = tracker.update(&[det_at(10.0, 10.0)], t0 + secs(11.0));
        assert!(tracks.contains_key(&2));
        assert!(!tracks.contains_key(&1));
        assert_eq!(tracker.issued_count(), 2);
    }

    #[test]
    fn test_huge_timeout_does_not_panic() {
        let config = TrackerConfig {
            timeout_secs: 1e20,
            ..Default::default()
        };
        assert_eq!(config.timeout(), Duration::MAX);
        assert_eq!(config.retention(), Some(Duration::MAX));

        let mut tracker = CentroidTracker::new(config);
        let t0 = Instant::now();
        tracker.update(&[det_at(10.0, 10.0)], t0);
        let tracks = tracker.update(&[], t0 + secs(3600.0));
        assert!(tracks[&1].is_active());
        assert_eq!(tracker.evict_stale(t0 + secs(3600.0)), 0);

        let nan = TrackerConfig {
            timeout_secs: f64::NAN,
            ..Default::default()
        };
        assert_eq!(nan.timeout(), Duration::ZERO);
    }

    #[test]
    fn test_non_finite_detection_is_ignored() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();
        tracker.update(&[det_at(10.0, 10.0)], t0);
        let before = tracker.tracks()[&1].centroid();

        let mut broken = det_at(10.0, 10.0);
        broken.bbox.x = f32::NAN;
        let mut infinite = det_at(10.0, 10.0);
        infinite.bbox.width = f32::INFINITY;
        let tracks = tracker.update(&[broken, infinite], t0 + secs(0.1));

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[&1].centroid(), before);
        assert_eq!(tracker.issued_count(), 1);
    }

    #[test]
    fn test_nan_max_distance_never_matches() {
        let config = TrackerConfig {
            max_distance: f32::NAN,
            ..Default::default()
        };
        let mut tracker = CentroidTracker::new(config);
        let t0 = Instant::now();
        tracker.update(&[det_at(10.0, 10.0)], t0);
        let tracks = tracker.update(&[det_at(10.0, 10.0)], t0 + secs(0.1));
        assert_eq!(tracks.len(), 2);
    }

    #[test]
    fn test_reset() {
        let mut tracker = CentroidTracker::default();
        let t0 = Instant::now();
        tracker.update(&[det_at(10.0, 10.0), det_at(300.0, 300.0)], t0);
        tracker.reset();
        assert_eq!(tracker.track_count(), 0);
        let tracks = tracker.update(&[det_at(10.0, 10.0)], t0);
        assert!(tracks.contains_key(&1));
    }

    #[test]
    fn test_random_sequences_hold_invariants() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = TrackerConfig {
            retention_factor: 0.0,
            ..Default::default()
        };
        let mut tracker = CentroidTracker::new(config);
        let mut now = Instant::now();
        let mut retired: HashSet<u64> = HashSet::new();
        let mut prev_ids: Vec<u64> = Vec::new();

        for _ in 0..200 {
            now += secs(rng.gen_range(0.05..1.5));
            let n = rng.gen_range(0..6);
            let dets: Vec<Detection> = (0..n)
                .map(|_| det_at(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0)))
                .collect();

            let before = tracker.track_count();
            let tracks = tracker.update(&dets, now);
            assert!(tracks.len() >= before);
            assert!(tracks.len() <= before + dets.len());

            let ids: Vec<u64> = tracks.keys().copied().collect();
            assert!(ids.starts_with(&prev_ids));
            for track in tracks.values() {
                assert!(track.history().len() <= 30);
                if retired.contains(&track.id()) {
                    assert!(!track.is_active());
                }
                if !track.is_active() {
                    retired.insert(track.id());
                }
            }
            prev_ids = ids;
        }
    }
}
