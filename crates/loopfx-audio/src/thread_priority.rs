//! Real-time thread priority elevation for the capture and render callbacks.
//!
//! - **macOS**: pthread QoS class (`USER_INTERACTIVE`) plus a real-time
//!   thread time-constraint policy.
//! - **Windows**: MMCSS "Pro Audio" task characteristics, falling back to
//!   `THREAD_PRIORITY_TIME_CRITICAL`.
//! - **Linux**: `SCHED_FIFO`, falling back to `SCHED_RR`, falling back to
//!   `pthread_setschedparam`.
//!
//! Call `set_realtime_priority()` once per audio thread, right after the
//! thread is spawned by the host audio subsystem.

use std::cell::Cell;

thread_local! {
    static PRIORITY_SET: Cell<bool> = const { Cell::new(false) };
}

/// Outcome of a real-time priority elevation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityResult {
    Success,
    AlreadySet,
    Failed,
    Unsupported,
}

/// Elevate the calling thread to real-time priority. Idempotent per thread:
/// a second call on the same thread returns `AlreadySet` once the first has
/// succeeded. The capture and render callbacks run on distinct OS threads,
/// so each must call this itself — the guard is thread-local, not process-wide.
pub fn set_realtime_priority() -> PriorityResult {
    if PRIORITY_SET.with(|set| set.replace(true)) {
        return PriorityResult::AlreadySet;
    }

    let result = platform_set_priority();

    match result {
        PriorityResult::Success => {
            log::info!("audio thread elevated to real-time priority");
        }
        PriorityResult::Failed => {
            log::warn!("failed to set real-time thread priority (non-fatal)");
            PRIORITY_SET.with(|set| set.set(false));
        }
        PriorityResult::Unsupported => {
            log::debug!("real-time priority not supported on this platform");
        }
        PriorityResult::AlreadySet => {}
    }

    result
}

#[doc(hidden)]
pub fn reset_priority_state() {
    PRIORITY_SET.with(|set| set.set(false));
}

#[cfg(target_os = "macos")]
fn platform_set_priority() -> PriorityResult {
    use std::mem::MaybeUninit;

    const QOS_CLASS_USER_INTERACTIVE: u32 = 0x21;

    #[repr(C)]
    struct ThreadTimeConstraintPolicy {
        period: u32,
        computation: u32,
        constraint: u32,
        preemptible: i32,
    }

    extern "C" {
        fn pthread_set_qos_class_self_np(qos_class: u32, relative_priority: i32) -> i32;
        fn mach_thread_self() -> u32;
        fn thread_policy_set(
            thread: u32,
            flavor: u32,
            policy_info: *const ThreadTimeConstraintPolicy,
            count: u32,
        ) -> i32;
    }

    let qos_result = unsafe { pthread_set_qos_class_self_np(QOS_CLASS_USER_INTERACTIVE, 0) };
    if qos_result != 0 {
        log::debug!("pthread_set_qos_class_self_np failed: {}", qos_result);
    }

    const THREAD_TIME_CONSTRAINT_POLICY: u32 = 2;
    const THREAD_TIME_CONSTRAINT_POLICY_COUNT: u32 = 4;

    #[repr(C)]
    struct MachTimebaseInfo {
        numer: u32,
        denom: u32,
    }

    extern "C" {
        fn mach_timebase_info(info: *mut MachTimebaseInfo) -> i32;
    }

    let timebase = unsafe {
        let mut info = MaybeUninit::<MachTimebaseInfo>::uninit();
        mach_timebase_info(info.as_mut_ptr());
        info.assume_init()
    };

    let ns_to_abs = |ns: u64| -> u32 { ((ns * timebase.denom as u64) / timebase.numer as u64) as u32 };

    let policy = ThreadTimeConstraintPolicy {
        period: ns_to_abs(1_000_000),
        computation: ns_to_abs(500_000),
        constraint: ns_to_abs(1_000_000),
        preemptible: 1,
    };

    let thread = unsafe { mach_thread_self() };
    let result = unsafe { thread_policy_set(thread, THREAD_TIME_CONSTRAINT_POLICY, &policy, THREAD_TIME_CONSTRAINT_POLICY_COUNT) };

    if result == 0 || qos_result == 0 {
        PriorityResult::Success
    } else {
        log::debug!("thread_policy_set failed: {}", result);
        PriorityResult::Failed
    }
}

#[cfg(target_os = "windows")]
fn platform_set_priority() -> PriorityResult {
    use windows::core::PCWSTR;
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Threading::{
        AvSetMmThreadCharacteristicsW, GetCurrentThread, SetThreadPriority, THREAD_PRIORITY_TIME_CRITICAL,
    };

    let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
    let mut task_index: u32 = 0;

    let mmcss_handle = unsafe { AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index) };
    if !mmcss_handle.is_invalid() {
        log::debug!("MMCSS Pro Audio class registered (task index: {})", task_index);
        return PriorityResult::Success;
    }

    log::debug!("MMCSS registration failed, falling back to thread priority");

    let current_thread: HANDLE = unsafe { GetCurrentThread() };
    let result = unsafe { SetThreadPriority(current_thread, THREAD_PRIORITY_TIME_CRITICAL) };

    if result.as_bool() {
        PriorityResult::Success
    } else {
        PriorityResult::Failed
    }
}

#[cfg(target_os = "linux")]
fn platform_set_priority() -> PriorityResult {
    use libc::{pthread_self, pthread_setschedparam, sched_param, sched_setscheduler, SCHED_FIFO, SCHED_RR};

    let mut param = sched_param { sched_priority: 80 };
    let result = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
    if result == 0 {
        return PriorityResult::Success;
    }

    log::debug!("SCHED_FIFO failed (need CAP_SYS_NICE), trying SCHED_RR");
    param.sched_priority = 70;
    let result = unsafe { sched_setscheduler(0, SCHED_RR, &param) };
    if result == 0 {
        return PriorityResult::Success;
    }

    log::debug!("SCHED_RR failed, trying pthread_setschedparam");
    param.sched_priority = 50;
    let thread = unsafe { pthread_self() };
    let result = unsafe { pthread_setschedparam(thread, SCHED_FIFO, &param) };

    if result == 0 {
        PriorityResult::Success
    } else {
        log::debug!("all Linux RT scheduling methods failed (errno: {})", result);
        PriorityResult::Failed
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
fn platform_set_priority() -> PriorityResult {
    PriorityResult::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_priority_idempotent() {
        reset_priority_state();

        let first = set_realtime_priority();
        let second = set_realtime_priority();

        assert!(first == PriorityResult::Success || first == PriorityResult::Failed || first == PriorityResult::Unsupported);
        if first == PriorityResult::Success {
            assert_eq!(second, PriorityResult::AlreadySet);
        }

        reset_priority_state();
    }
}
