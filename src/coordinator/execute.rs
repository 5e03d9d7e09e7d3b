//! Child supervision: completion, timeout and interrupt

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use super::interrupt::InterruptFlag;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How a supervised child ended
#[derive(Debug)]
pub enum ChildExit {
    Exited(ExitStatus),
    TimedOut,
    Interrupted,
}

/// Wait for `child`, killing it on timeout or interrupt
pub fn supervise(
    child: &mut Child,
    timeout: Duration,
    grace: Duration,
    interrupt: &InterruptFlag,
) -> io::Result<ChildExit> {
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ChildExit::Exited(status));
        }
        if interrupt.is_set() {
            terminate(child, grace)?;
            return Ok(ChildExit::Interrupted);
        }
        if started.elapsed() >= timeout {
            log::warn!(
                "Worker {} exceeded {}s, terminating",
                child.id(),
                timeout.as_secs()
            );
            terminate(child, grace)?;
            return Ok(ChildExit::TimedOut);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM the child's process group, then SIGKILL after `grace`, then reap
pub fn terminate(child: &mut Child, grace: Duration) -> io::Result<()> {
    if child.try_wait()?.is_some() {
        return Ok(());
    }

    signal_group(child, Signal::Term);
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }

    log::warn!("Worker {} ignored SIGTERM, killing", child.id());
    signal_group(child, Signal::Kill);
    child.wait()?;
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(child: &mut Child, signal: Signal) {
    use nix::sys::signal::{Signal as Sig, killpg};
    use nix::unistd::Pid;

    let sig = match signal {
        Signal::Term => Sig::SIGTERM,
        Signal::Kill => Sig::SIGKILL,
    };
    let Ok(pgid) = i32::try_from(child.id()) else {
        return;
    };
    // the group was created for this child by `launcher::spawn`
    if let Err(e) = killpg(Pid::from_raw(pgid), sig) {
        log::debug!("killpg({pgid}, {sig}) failed: {e}");
    }
}

#[cfg(not(unix))]
fn signal_group(child: &mut Child, _signal: Signal) {
    let _ = child.kill();
}
