//! Monitor 单元测试

use super::*;

fn sample() -> ProcessSample {
    ProcessSample {
        time: 1700000000.25,
        node: "node01".to_string(),
        pid: 42,
        ppid: Some(1),
        cmd: Some("/usr/bin/fib".to_string()),
        cmdline: "\"fib 10 20\"".to_string(),
        cpu_percent: 99.5,
        num_threads: Some(4),
        mem: 1024,
        mem_percent: 0.125,
    }
}

#[cfg(test)]
mod metric_tests {
    use super::*;

    #[test]
    fn test_metric_names_roundtrip() {
        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>().unwrap(), metric);
        }
        assert!("affinity".parse::<Metric>().is_err());
    }

    #[test]
    fn test_header_skips_inactive() {
        let config = MonitorConfig {
            inactive: vec![Metric::Cmdline, Metric::Node],
            ..Default::default()
        };
        let metrics = config.active_metrics();
        assert_eq!(
            header(&metrics),
            "time,pid,ppid,cmd,cpu_percent,num_threads,mem,mem_percent"
        );
    }

    #[test]
    fn test_row_formatting() {
        let row = sample().row(&[Metric::Pid, Metric::Ppid, Metric::CpuPercent, Metric::Time]);
        assert_eq!(row, "42,1,99.50,1700000000.250");
    }

    #[test]
    fn test_missing_fields_are_empty() {
        let mut s = sample();
        s.ppid = None;
        s.cmd = None;
        s.num_threads = None;
        assert_eq!(s.row(&[Metric::Ppid, Metric::Cmd, Metric::NumThreads]), ",,");
    }
}

#[cfg(test)]
mod quoting_tests {
    use super::*;
    use std::ffi::OsString;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("fib-openmp"), "fib-openmp");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), "'it'\"'\"'s'");
    }

    #[test]
    fn test_quoted_cmdline() {
        let args = vec![OsString::from("./sleep"), OsString::from("4 5")];
        assert_eq!(quoted_cmdline(&args), "\"./sleep '4 5'\"");
    }
}

#[cfg(test)]
mod process_tests {
    use super::*;

    #[test]
    fn test_monitor_own_process() {
        let config = MonitorConfig {
            delta: Duration::from_millis(10),
            samples: Some(2),
            inactive: vec![Metric::Cmdline],
        };
        let me = std::process::id();
        let mut monitor = ProcessMonitor::new(me, config).unwrap();
        let mut out = Vec::new();
        let taken = monitor.run(&mut out).unwrap();
        assert_eq!(taken, 2);

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        let header_line = lines.next().unwrap();
        assert!(header_line.starts_with("time,node,pid,ppid"));
        let pid_column = header_line.split(',').position(|c| c == "pid").unwrap();
        let own_rows = lines
            .filter(|l| l.split(',').nth(pid_column) == Some(me.to_string().as_str()))
            .count();
        assert_eq!(own_rows, 2);
    }

    #[test]
    fn test_unknown_pid() {
        let err = ProcessMonitor::new(u32::MAX - 1, MonitorConfig::default()).unwrap_err();
        assert!(matches!(err, MonitorError::NoSuchProcess(_)));
    }

    #[test]
    fn test_ancestor_of_self_is_a_process() {
        let me = std::process::id();
        let ancestor = find_ancestor(me, None).unwrap();
        let system = refreshed_system();
        assert!(system.process(Pid::from_u32(ancestor)).is_some());
    }

    #[test]
    fn test_find_pids_unknown_name() {
        assert!(find_pids("no-such-process-name-for-workpool").is_empty());
    }

    #[test]
    fn test_descendants_start_with_root() {
        let system = refreshed_system();
        let me = Pid::from_u32(std::process::id());
        let tree = descendants(&system, me);
        assert_eq!(tree[0], me);
    }
}
