//! Scaled virtual time driver for Embassy, used by tests and the demo
//! binary to run many MLST periods without waiting on real wall-clock
//! seconds: a real<->virtual tick mapping and a scheduler thread driving
//! `embassy_time_driver::Driver`, exposed through a plain
//! `set_time_scale_percent` knob.
//!
//! - Rebasing only the real origin on speed changes, keeping the virtual origin
//!   fixed so scheduled deadlines never wrap into the past.
//! - Slicing scheduler waits (<= 25 ms) and bumping an epoch flag on speed
//!   updates so the scheduler re-evaluates promptly.
//! - Guarding conversions between real/virtual to avoid under/overflow.
//!
//! ## Lock ordering
//!
//! CLOCK must always be acquired before SCHED, never both at once unless
//! data is extracted from one and dropped before acquiring the other.

use core::task::Waker;
use embassy_time_driver::{time_driver_impl, Driver, TICK_HZ};
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, OnceLock};
use std::time::{Duration, Instant as StdInstant};

const ONE_Q32: u64 = 1u64 << 32;

#[derive(Debug)]
struct ScaledClock {
    origin_real: StdInstant,
    origin_virtual_ticks: u64,
    scale_q32: u64,
    last_set_percent: u32,
}

#[derive(Default)]
struct SchedulerState {
    queue: BTreeMap<u64, Vec<Waker>>,
    epoch: u64,
}

static CLOCK: OnceLock<Mutex<ScaledClock>> = OnceLock::new();
static SCHED: OnceLock<Mutex<SchedulerState>> = OnceLock::new();
static CV: OnceLock<Condvar> = OnceLock::new();
static SCHEDULER_STARTED: OnceLock<()> = OnceLock::new();

fn clock() -> &'static Mutex<ScaledClock> {
    CLOCK.get_or_init(|| {
        Mutex::new(ScaledClock {
            origin_real: StdInstant::now(),
            origin_virtual_ticks: 0,
            scale_q32: ONE_Q32,
            last_set_percent: 100,
        })
    })
}

fn sched() -> &'static Mutex<SchedulerState> {
    SCHED.get_or_init(|| Mutex::new(SchedulerState::default()))
}

fn cv() -> &'static Condvar {
    CV.get_or_init(Condvar::new)
}

fn tick_hz() -> u64 {
    TICK_HZ as u64
}

fn real_now() -> StdInstant {
    StdInstant::now()
}

fn map_real_to_virtual(r: StdInstant) -> u64 {
    let clock_lock = clock().lock().unwrap();
    let real_dt = r.saturating_duration_since(clock_lock.origin_real);
    let real_ticks = (real_dt.as_nanos() as u128 * tick_hz() as u128 / 1_000_000_000u128) as u64;
    let scaled = ((real_ticks as u128) * (clock_lock.scale_q32 as u128) / (ONE_Q32 as u128)) as u64;
    clock_lock.origin_virtual_ticks.wrapping_add(scaled)
}

fn map_virtual_to_real(v_target: u64) -> StdInstant {
    let clock_lock = clock().lock().unwrap();
    let virt_dt = match v_target.checked_sub(clock_lock.origin_virtual_ticks) {
        Some(dt) => dt,
        None => return clock_lock.origin_real,
    };
    let real_ticks = ((virt_dt as u128) * (ONE_Q32 as u128) / (clock_lock.scale_q32 as u128)) as u64;
    let real_ns = (real_ticks as u128) * 1_000_000_000u128 / (tick_hz() as u128);
    let real_ns_u64 = real_ns.min(u64::MAX as u128) as u64;
    clock_lock.origin_real + Duration::from_nanos(real_ns_u64)
}

fn ensure_scheduler_thread() {
    SCHEDULER_STARTED.get_or_init(|| {
        std::thread::Builder::new()
            .name("mlst-virtual-time-scheduler".into())
            .spawn(scheduler_thread)
            .expect("failed to start virtual time scheduler thread");
    });
}

fn scheduler_thread() {
    const MAX_WAIT_SLICE: Duration = Duration::from_millis(25);
    loop {
        let (next_at, snapshot_epoch) = loop {
            let guard = sched().lock().unwrap();
            if guard.queue.is_empty() {
                let guard = cv().wait(guard).unwrap();
                drop(guard);
                continue;
            }
            let (&next_at, _) = guard.queue.iter().next().unwrap();
            let snapshot_epoch = guard.epoch;
            drop(guard);
            break (next_at, snapshot_epoch);
        };

        let real_target = map_virtual_to_real(next_at);
        let now_r = real_now();

        if real_target > now_r {
            let mut wait_dur = real_target - now_r;
            if wait_dur > MAX_WAIT_SLICE {
                wait_dur = MAX_WAIT_SLICE;
            }
            let guard = sched().lock().unwrap();
            let (new_guard, _timeout) = cv().wait_timeout(guard, wait_dur).unwrap();
            let changed = new_guard.epoch != snapshot_epoch;
            drop(new_guard);
            if changed {
                continue;
            }
            continue;
        }

        let now_v = map_real_to_virtual(real_now());
        let mut ready: Vec<Waker> = Vec::new();
        {
            let mut guard = sched().lock().unwrap();
            let mut to_remove = Vec::new();
            for (&ts, ws) in guard.queue.iter() {
                if ts <= now_v {
                    ready.extend(ws.iter().cloned());
                    to_remove.push(ts);
                } else {
                    break;
                }
            }
            for ts in to_remove {
                guard.queue.remove(&ts);
            }
        }

        for w in ready {
            w.wake();
        }
    }
}

struct ScaledDriver;

impl Driver for ScaledDriver {
    fn now(&self) -> u64 {
        map_real_to_virtual(real_now())
    }

    fn schedule_wake(&self, at: u64, waker: &Waker) {
        ensure_scheduler_thread();
        let mut guard = sched().lock().unwrap();
        guard.queue.entry(at).or_default().push(waker.clone());
        drop(guard);
        cv().notify_all();
    }
}

time_driver_impl!(static DRIVER: ScaledDriver = ScaledDriver);

/// Set how fast virtual time runs relative to real time, in percent
/// (1..=1000). Used by tests to fast-forward MLST periods instead of
/// sleeping real seconds.
pub fn set_time_scale_percent(percent: u32) {
    let percent = percent.clamp(1, 1000);
    if get_time_scale_percent() == percent {
        return;
    }
    let r_now = real_now();
    let v_now_old = map_real_to_virtual(r_now);
    let new_scale_q32 = ((percent as u128) * (ONE_Q32 as u128) / 100u128) as u64;

    {
        let mut c = clock().lock().unwrap();
        let origin_virtual = c.origin_virtual_ticks;
        let delta_v = v_now_old.saturating_sub(origin_virtual) as u128;
        let real_elapsed_new_ticks = if new_scale_q32 == 0 {
            0
        } else {
            delta_v * (ONE_Q32 as u128) / (new_scale_q32 as u128)
        };
        let real_elapsed_new_ns = real_elapsed_new_ticks * 1_000_000_000u128 / (tick_hz() as u128);
        let dur = Duration::from_nanos(real_elapsed_new_ns.min(u64::MAX as u128) as u64);
        c.origin_real = r_now.checked_sub(dur).unwrap_or(r_now);
        c.scale_q32 = new_scale_q32;
        c.last_set_percent = percent;
    }

    {
        let mut s = sched().lock().unwrap();
        s.epoch = s.epoch.wrapping_add(1);
    }

    cv().notify_all();
}

pub fn get_time_scale_percent() -> u32 {
    clock().lock().unwrap().last_set_percent
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    static TEST_GUARD: StdMutex<()> = StdMutex::new(());

    #[test]
    fn continuity_on_speed_change_preserves_mapping() {
        let _g = TEST_GUARD.lock().unwrap();
        set_time_scale_percent(100);
        let anchor = real_now();
        let v_before = map_real_to_virtual(anchor);
        set_time_scale_percent(400);
        let v_after = map_real_to_virtual(anchor);
        let diff = v_after.abs_diff(v_before);
        assert!(diff <= tick_hz() / 100, "diff={diff} ticks");
    }

    #[test]
    fn virtual_to_real_scales_inverse_with_speed() {
        let _g = TEST_GUARD.lock().unwrap();
        set_time_scale_percent(100);
        set_time_scale_percent(200);
        let now_r = real_now();
        let now_v = map_real_to_virtual(now_r);
        let dt_v_ticks = (tick_hz() as f64 * 0.2) as u64;
        let target_v = now_v.wrapping_add(dt_v_ticks);
        let target_r = map_virtual_to_real(target_v);
        let real_dt = target_r.duration_since(now_r);
        let expected_secs = 0.1;
        let diff = (real_dt.as_secs_f64() - expected_secs).abs();
        assert!(diff < 0.01, "expected ~{expected_secs}s, got {:?}", real_dt);
    }
}
