#[cfg(test)]
mod tests {
    use crate::backend::scheduler::{Scheduler, SimEvent};
    use crate::cpu::{SimConfig, CPU};
    use crate::error::SimError;
    use crate::instructions::instructions::ValueType;
    use crate::loader::loader::{parse_program, LoadError};

    const MAX_CYCLES: u64 = 10_000;

    #[test]
    fn test_daddi() {
        let src = r#"
    DADDI R1, R0, 5
    DADDI R1, R1, 10
    DSUBI R2, R1, 20
"#;
        let mut harness = TestHarness::default();
        harness.run(src);
        harness.assert_reg_value("R1", 15.0);
        harness.assert_reg_value("R2", -5.0);
        harness.assert_no_pending_tags();
    }

    #[test]
    fn test_fp_arithmetic() {
        let src = r#"
    ADD.D F3, F1, F2
    SUB.D F4, F1, F2
    MUL.D F5, F1, F2
    DIV.D F6, F1, F2
    DIV.S F7, F0, F2
"#;
        let mut harness = TestHarness::with_registers(&[("F0", 1.0), ("F1", 6.0), ("F2", 1.5)]);
        harness.run(src);
        harness.assert_reg_value("F3", 7.5);
        harness.assert_reg_value("F4", 4.5);
        harness.assert_reg_value("F5", 9.0);
        harness.assert_reg_value("F6", 4.0);
        harness.assert_reg_value("F7", (1.0f32 / 1.5f32) as ValueType);
    }

    #[test]
    fn test_divide_by_zero() {
        let src = r#"
    DIV.D F2, F1, F0
"#;
        let mut harness = TestHarness::with_registers(&[("F1", 3.0), ("F2", 9.0)]);
        harness.run(src);
        harness.assert_reg_value("F2", 0.0);
    }

    #[test]
    fn test_raw_dependency() {
        let src = r#"
    MUL.D F3, F1, F2
    ADD.D F4, F3, F1
    ADD.D F5, F4, F4
"#;
        let mut harness = TestHarness::with_registers(&[("F1", 2.0), ("F2", 3.0)]);
        harness.run(src);
        harness.assert_reg_value("F3", 6.0);
        harness.assert_reg_value("F4", 8.0);
        harness.assert_reg_value("F5", 16.0);
    }

    #[test]
    fn test_rob_retires_in_order() {
        let src = r#"
    DIV.D F3, F1, F2
    ADD.D F4, F1, F2
    DADDI R1, R0, 1
"#;
        let mut harness = TestHarness::with_registers(&[("F1", 8.0), ("F2", 2.0)]);
        harness.load(src);

        let mut saw_younger_ready_behind_head = false;
        while !harness.scheduler().is_finished() {
            harness.step();
            let scheduler = harness.scheduler();
            let entries = scheduler.rob_entries();

            // retired tags always form a prefix of the issued ones
            if let Some(head) = entries.first() {
                assert_eq!(head.entry, scheduler.perf_counters().commit_cnt);
            }
            for window in entries.windows(2) {
                assert_eq!(window[0].entry + 1, window[1].entry);
            }

            if entries.len() > 1 && !entries[0].ready && entries[1].ready {
                saw_younger_ready_behind_head = true;
                // the ADD.D finished but may not write F4 before the DIV.D retires
                assert_eq!(scheduler.register("F4").unwrap().value, 0.0);
            }
            assert!(scheduler.cycle() < MAX_CYCLES);
        }

        assert!(saw_younger_ready_behind_head);
        harness.assert_reg_value("F3", 4.0);
        harness.assert_reg_value("F4", 10.0);
        harness.assert_reg_value("R1", 1.0);
        assert_eq!(harness.scheduler().perf_counters().commit_cnt, 3);
    }

    #[test]
    fn test_waw_keeps_youngest_writer() {
        let src = r#"
    DIV.D F2, F0, F1
    ADD.D F3, F2, F1
    ADD.D F2, F4, F5
    ADD.D F6, F2, F0
"#;
        let mut harness = TestHarness::with_registers(&[("F0", 8.0), ("F1", 2.0), ("F4", 1.0), ("F5", 2.0)]);
        harness.run(src);
        // the reader between the two writers sees the DIV.D result
        harness.assert_reg_value("F3", 6.0);
        // the reader after the second writer sees the ADD.D result
        harness.assert_reg_value("F6", 11.0);
        harness.assert_reg_value("F2", 3.0);
        harness.assert_no_pending_tags();
    }

    #[test]
    fn test_structural_hazard() {
        let src = r#"
    MUL.D F3, F1, F2
    MUL.D F4, F1, F2
    MUL.D F5, F1, F2
"#;
        let mut harness = TestHarness::with_registers(&[("F1", 2.0), ("F2", 3.0)]);
        harness.load(src);

        // two multiply stations: the third MUL.D waits until the first one has written back
        harness.step_n(12);
        assert_eq!(harness.scheduler().pending_instructions(), 1);
        assert!(harness.scheduler().perf_counters().issue_stall_cnt >= 10);

        harness.step();
        assert_eq!(harness.scheduler().pending_instructions(), 0);

        harness.run_to_end();
        harness.assert_reg_value("F3", 6.0);
        harness.assert_reg_value("F4", 6.0);
        harness.assert_reg_value("F5", 6.0);
    }

    #[test]
    fn test_rob_full_stalls_issue() {
        let src = r#"
    DADDI R1, R0, 1
    DADDI R2, R0, 2
    DADDI R3, R0, 3
    DADDI R4, R0, 4
"#;
        let mut config = TestHarness::new_test_config();
        config.rob_capacity = 2;
        let mut harness = TestHarness::new(config);
        harness.run(src);
        assert!(harness.scheduler().perf_counters().issue_stall_cnt > 0);
        harness.assert_reg_value("R1", 1.0);
        harness.assert_reg_value("R4", 4.0);
    }

    #[test]
    fn test_cache_miss_timing() {
        let src = r#"
    L.D F1, 0(R0)
"#;
        let mut harness = TestHarness::default();
        harness.load(src);

        harness.step();
        let events = harness.step();
        assert_eq!(events, vec![SimEvent::CacheMiss { address: 0 }]);

        // issue in cycle 1, hit latency plus miss penalty from cycle 2, writeback in cycle 13
        harness.step_n(10);
        assert!(!harness.scheduler().rob_entries()[0].ready);
        harness.step();
        assert!(harness.scheduler().rob_entries()[0].ready);

        harness.run_to_end();
        assert_eq!(harness.scheduler().perf_counters().cache_miss_cnt, 1);
    }

    #[test]
    fn test_cache_hit_timing() {
        let src = r#"
    L.D F1, 4(R0)
"#;
        let mut harness = TestHarness::default();
        // warm up the block with a load to the neighbouring word
        harness.run("L.D F0, 0(R0)");
        assert_eq!(harness.scheduler().perf_counters().cache_miss_cnt, 1);

        harness.load(src);
        let start = harness.scheduler().perf_counters().cycle_cnt;
        harness.step_n(2);
        assert!(!harness.scheduler().rob_entries()[0].ready);
        harness.step();
        assert!(harness.scheduler().rob_entries()[0].ready);
        assert_eq!(harness.scheduler().perf_counters().cycle_cnt - start, 3);
        assert_eq!(harness.scheduler().perf_counters().cache_hit_cnt, 1);
    }

    #[test]
    fn test_second_load_to_same_block_hits() {
        let src = r#"
    L.D F1, 0(R0)
    L.D F2, 8(R0)
"#;
        let mut harness = TestHarness::with_memory(&[(0, 3), (8, 5)]);
        harness.load(src);

        harness.step_n(4);
        let entries = harness.scheduler().rob_entries();
        assert!(!entries[0].ready);
        assert!(entries[1].ready);

        harness.run_to_end();
        harness.assert_reg_value("F1", 3.0);
        harness.assert_reg_value("F2", 5.0);
        let perf_counters = harness.scheduler().perf_counters();
        assert_eq!(perf_counters.cache_miss_cnt, 1);
        assert_eq!(perf_counters.cache_hit_cnt, 1);
    }

    #[test]
    fn test_conflicting_blocks_evict_each_other() {
        // 256 byte cache with 16 byte blocks: addresses 0 and 256 share block 0
        let src = r#"
    L.D F1, 256(R0)
    L.D F2, 0(R0)
    L.D F3, 256(R0)
"#;
        let mut harness = TestHarness::default();
        harness.run(src);

        let misses = harness.cpu.events().iter()
            .filter(|event| matches!(event, SimEvent::CacheMiss { .. }))
            .count();
        assert_eq!(misses, 3);

        let status = harness.scheduler().cache_status();
        assert_eq!(status.len(), 16);
        assert_eq!(status[0], "Block 0: Valid, Tag=16");
        assert_eq!(status[1], "Block 1: Invalid");
    }

    #[test]
    fn test_load_from_initial_memory() {
        let src = r#"
    LW R1, 8(R0)
    DADDI R2, R1, 1
    SW R2, 12(R0)
"#;
        let mut harness = TestHarness::with_memory(&[(8, 42)]);
        harness.run(src);
        harness.assert_reg_value("R1", 42.0);
        harness.assert_reg_value("R2", 43.0);
        assert_eq!(harness.scheduler().read_memory_word(12), 43);
    }

    #[test]
    fn test_negative_effective_address_wraps() {
        let src = r#"
    DADDI R1, R0, -4
    LW R2, 0(R1)
"#;
        let mut harness = TestHarness::default();
        harness.scheduler_mut().write_memory_word(4092, 9);
        harness.run(src);
        harness.assert_reg_value("R2", 9.0);
    }

    #[test]
    fn test_store_truncates_value() {
        let src = r#"
    S.D F1, 16(R0)
    L.D F2, 16(R0)
"#;
        let mut harness = TestHarness::with_registers(&[("F1", -2.75)]);
        harness.run(src);
        assert_eq!(harness.scheduler().read_memory_word(16), -2);
        harness.assert_reg_value("F2", -2.0);
    }

    #[test]
    fn test_store_then_load_same_address() {
        let src = r#"
    S.D F1, 0(R0)
    L.D F2, 0(R0)
"#;
        let mut harness = TestHarness::with_registers(&[("F1", 7.0)]);
        harness.load(src);

        let mut clash_cycles = Vec::new();
        while !harness.scheduler().is_finished() {
            let events = harness.step();
            let cycle = harness.scheduler().cycle();
            for event in events {
                if let SimEvent::AddressClash { station, address, .. } = event {
                    assert_eq!(station, "Load0");
                    assert_eq!(address, 0);
                    clash_cycles.push(cycle);
                }
            }
        }

        // the load waits until the store has committed in cycle 14
        assert_eq!(clash_cycles, (3..=13).collect::<Vec<u64>>());
        assert_eq!(harness.scheduler().cycle(), 16);
        harness.assert_reg_value("F2", 7.0);
        assert_eq!(harness.scheduler().read_memory_word(0), 7);
    }

    #[test]
    fn test_load_waits_for_store_with_pending_value() {
        let src = r#"
    L.D F9, 0(R0)
    DIV.D F2, F0, F1
    S.D F2, 8(R0)
    L.D F3, 8(R0)
"#;
        let mut harness = TestHarness::with_registers(&[("F0", 14.0), ("F1", 2.0)]);
        harness.run(src);
        assert_eq!(harness.scheduler().read_memory_word(8), 7);
        harness.assert_reg_value("F3", 7.0);

        let clashes = harness.address_clashes();
        assert!(!clashes.is_empty());
        assert!(clashes.iter().all(|(station, address, _)| station == "Load1" && *address == 8));
    }

    #[test]
    fn test_load_waits_for_store_with_pending_base() {
        let src = r#"
    L.D F9, 0(R0)
    LW R1, 100(R0)
    S.D F2, 8(R1)
    L.D F3, 8(R0)
"#;
        let mut harness = TestHarness::with_registers(&[("F2", 7.0)]);
        harness.run(src);
        assert_eq!(harness.scheduler().read_memory_word(8), 7);
        harness.assert_reg_value("F3", 7.0);

        // first the store's address is unknown, then it matches
        let clashes = harness.address_clashes();
        assert!(clashes.iter().any(|(_, _, reason)| reason.contains("Store0") && reason.contains("no address yet")));
        assert!(clashes.iter().any(|(_, _, reason)| reason.contains("same address")));
    }

    #[test]
    fn test_huge_base_register_saturates() {
        let src = r#"
    LW R2, 8(R1)
    LW R3, 8(R4)
"#;
        let mut harness = TestHarness::with_registers(&[("R1", 1.0e19), ("R4", -1.0e19)]);
        // i64::MAX wraps to 4095, aligned down to 4092; i64::MIN + 8 wraps to 8
        harness.scheduler_mut().write_memory_word(4092, 5);
        harness.scheduler_mut().write_memory_word(8, 9);
        harness.run(src);
        harness.assert_reg_value("R2", 5.0);
        harness.assert_reg_value("R3", 9.0);
    }

    #[test]
    fn test_loads_to_same_address_do_not_clash() {
        let src = r#"
    L.D F1, 0(R0)
    L.D F2, 0(R0)
"#;
        let mut harness = TestHarness::default();
        harness.run(src);
        assert_eq!(harness.scheduler().perf_counters().address_clash_cnt, 0);
    }

    #[test]
    fn test_branch_taken_flushes_queue() {
        let src = r#"
    DADDI R1, R0, 5
    DADDI R2, R0, 5
    BEQ R1, R2, 2
    DADDI R3, R0, 1
"#;
        let mut harness = TestHarness::default();
        harness.load(src);

        harness.step_n(5);
        assert_eq!(harness.scheduler().pending_instructions(), 1);
        harness.step();
        assert_eq!(harness.scheduler().pending_instructions(), 0);
        assert_eq!(harness.scheduler().pc(), 20);

        harness.run_to_end();
        harness.assert_reg_value("R3", 0.0);
        let perf_counters = harness.scheduler().perf_counters();
        assert_eq!(perf_counters.branch_taken_cnt, 1);
        assert_eq!(perf_counters.flushed_cnt, 1);
    }

    #[test]
    fn test_branch_not_taken() {
        let src = r#"
    DADDI R1, R0, 5
    DADDI R2, R0, 5
    BNE R1, R2, 2
    DADDI R3, R0, 1
"#;
        let mut harness = TestHarness::default();
        harness.run(src);
        harness.assert_reg_value("R3", 1.0);
        assert_eq!(harness.scheduler().pc(), 16);
        assert_eq!(harness.scheduler().perf_counters().branch_taken_cnt, 0);
    }

    #[test]
    fn test_snapshots() {
        let src = r#"
    L.D F0, 0(R0)
"#;
        let mut harness = TestHarness::default();
        harness.load(src);
        harness.step();

        let scheduler = harness.scheduler();
        let stations = scheduler.stations();
        let load0 = stations.iter().find(|s| s.name == "Load0").unwrap();
        assert!(load0.busy);
        assert_eq!(load0.opcode, "L.D");
        assert_eq!(load0.qj, "");
        assert!(stations.iter().filter(|s| s.name != "Load0").all(|s| !s.busy));

        let entries = scheduler.rob_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry, 0);
        assert_eq!(entries[0].instr, "L.D");
        assert_eq!(entries[0].dest, "F0");
        assert!(!entries[0].ready);

        let registers = scheduler.registers();
        let f0 = registers.iter().find(|r| r.name == "F0").unwrap();
        assert_eq!(f0.tag.as_deref(), Some("ROB0"));
        assert_eq!(registers.len(), 64);
    }

    #[test]
    fn test_pending_operand_shows_tag() {
        let src = r#"
    MUL.D F3, F1, F2
    ADD.D F4, F3, F1
"#;
        let mut harness = TestHarness::with_registers(&[("F1", 2.0)]);
        harness.load(src);
        harness.step_n(2);

        let stations = harness.scheduler().stations();
        let add0 = stations.iter().find(|s| s.name == "Add0").unwrap();
        assert_eq!(add0.qj, "ROB0");
        assert_eq!(add0.vj, "");
        assert_eq!(add0.vk, "2");
        assert_eq!(add0.qk, "");
    }

    #[test]
    fn test_reset() {
        let src = r#"
    DADDI R1, R0, 5
    L.D F2, 8(R0)
    S.D F1, 0(R0)
"#;
        let mut config = TestHarness::new_test_config();
        config.registers.insert(String::from("F1"), 1.5);
        config.memory.insert(8, 11);
        let mut harness = TestHarness::new(config);
        harness.run(src);
        harness.assert_reg_value("R1", 5.0);
        harness.scheduler_mut().set_register("F1", 99.0).unwrap();
        assert_eq!(harness.scheduler().read_memory_word(0), 1);

        harness.scheduler_mut().reset();

        let scheduler = harness.scheduler();
        assert_eq!(scheduler.cycle(), 0);
        assert_eq!(scheduler.pc(), 0);
        assert!(scheduler.is_finished());
        assert_eq!(scheduler.perf_counters().commit_cnt, 0);
        harness.assert_reg_value("R1", 0.0);
        harness.assert_reg_value("F1", 1.5);
        harness.assert_reg_value("F2", 0.0);
        assert_eq!(scheduler.read_memory_word(0), 0);
        assert_eq!(scheduler.read_memory_word(8), 11);
        assert!(scheduler.cache_status().iter().all(|line| line.ends_with("Invalid")));
    }

    #[test]
    fn test_unknown_register() {
        let mut harness = TestHarness::default();
        assert_eq!(harness.scheduler_mut().set_register("X1", 1.0), Err(SimError::UnknownRegister(String::from("X1"))));
        assert!(harness.scheduler().register("F32").is_err());
    }

    #[test]
    fn test_integer_register_truncates() {
        let src = r#"
    DADDI R2, R1, 1
"#;
        let mut harness = TestHarness::default();
        harness.scheduler_mut().set_register("R1", 2.9).unwrap();
        harness.assert_reg_value("R1", 2.0);
        harness.run(src);
        harness.assert_reg_value("R2", 3.0);
    }

    #[test]
    fn test_invalid_configuration() {
        let mut config = SimConfig::default();
        config.cache.block_size = 48;
        assert!(matches!(Scheduler::new(&config), Err(SimError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_run_stops_at_max_cycles() {
        let src = r#"
    DIV.D F1, F2, F3
"#;
        let mut harness = TestHarness::default();
        harness.load(src);
        assert_eq!(harness.cpu.run(5), 5);
        assert!(!harness.scheduler().is_finished());
        harness.run_to_end();
        assert!(harness.scheduler().is_finished());
    }

    #[test]
    fn test_step_on_empty_program_is_harmless() {
        let mut harness = TestHarness::default();
        assert!(harness.scheduler().is_finished());
        assert!(harness.step().is_empty());
        assert_eq!(harness.scheduler().cycle(), 1);
        assert!(harness.scheduler().is_finished());
    }

    #[test]
    fn test_unsupported_instruction_is_rejected() {
        assert!(matches!(parse_program("DMUL R1, R2, R3"), Err(LoadError::UnsupportedOpcode(_))));
    }

    struct TestHarness {
        cpu: CPU,
    }

    impl TestHarness {
        fn default() -> TestHarness {
            Self::new(Self::new_test_config())
        }

        fn new(config: SimConfig) -> TestHarness {
            let _ = env_logger::builder().is_test(true).try_init();
            TestHarness { cpu: CPU::new(&config).unwrap() }
        }

        fn new_test_config() -> SimConfig {
            let mut config = SimConfig::default();
            config.trace.issue = true;
            config.trace.commit = true;
            config
        }

        fn with_registers(registers: &[(&str, ValueType)]) -> TestHarness {
            let mut config = Self::new_test_config();
            for (name, value) in registers {
                config.registers.insert(name.to_string(), *value);
            }
            Self::new(config)
        }

        fn with_memory(words: &[(u32, i32)]) -> TestHarness {
            let mut config = Self::new_test_config();
            for (addr, value) in words {
                config.memory.insert(*addr, *value);
            }
            Self::new(config)
        }

        fn load(&mut self, src: &str) {
            match parse_program(src) {
                Ok(program) => self.cpu.load_program(program),
                Err(err) => panic!("Failed to parse test program: {}", err),
            }
        }

        fn run(&mut self, src: &str) {
            self.load(src);
            self.run_to_end();
        }

        fn run_to_end(&mut self) {
            self.cpu.run(MAX_CYCLES);
            assert!(self.scheduler().is_finished(), "program did not drain within {} cycles", MAX_CYCLES);
        }

        fn step(&mut self) -> Vec<SimEvent> {
            self.cpu.scheduler_mut().step()
        }

        fn step_n(&mut self, n: usize) {
            for _ in 0..n {
                self.step();
            }
        }

        fn scheduler(&self) -> &Scheduler {
            self.cpu.scheduler()
        }

        fn scheduler_mut(&mut self) -> &mut Scheduler {
            self.cpu.scheduler_mut()
        }

        fn assert_reg_value(&self, name: &str, value: ValueType) {
            let entry = self.scheduler().register(name).unwrap();
            assert_eq!(entry.value, value, "register {}", name);
        }

        fn address_clashes(&self) -> Vec<(String, u32, String)> {
            self.cpu.events().iter().filter_map(|event| match event {
                SimEvent::AddressClash { station, address, reason } => Some((station.clone(), *address, reason.clone())),
                SimEvent::CacheMiss { .. } => None,
            }).collect()
        }

        fn assert_no_pending_tags(&self) {
            for register in self.scheduler().registers() {
                assert_eq!(register.tag, None, "register {} still renamed", register.name);
            }
        }
    }
}
