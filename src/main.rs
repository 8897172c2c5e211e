use std::path::PathBuf;
use std::process::exit;

use log::{error, info};
use structopt::StructOpt;

use tomasulo_sim::cpu::{load_sim_config, SimConfig, CPU};
use tomasulo_sim::loader::loader::{load, LoadError};

#[derive(StructOpt, Debug)]
#[structopt(name = "Tomasulo Simulator")]
struct Opt {
    /// Path of the program to load
    #[structopt(short, long, parse(from_os_str))]
    file: PathBuf,

    /// Sets a custom config file; the built-in defaults are used when absent
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// Stops the simulation after this many cycles
    #[structopt(short, long, default_value = "10000")]
    max_cycles: u64,

    /// Prints the stations and the reorder buffer after every cycle
    #[structopt(short, long)]
    show_state: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::from_args();

    let sim_config = match &opt.config {
        Some(path) => {
            let sim_config_path = path.to_string_lossy();
            match load_sim_config(&sim_config_path) {
                Ok(config) => config,
                Err(err) => {
                    error!("Failed to load {}. Cause: {}", sim_config_path, err);
                    exit(1);
                }
            }
        }
        None => SimConfig::default(),
    };

    let path = opt.file.to_string_lossy();
    info!("Loading {}", path);
    let program = match load(&path) {
        Ok(program) => program,
        Err(err) => {
            error!("Loading program '{}' failed.", path);
            match err {
                LoadError::ParseError(msg) |
                LoadError::UnsupportedOpcode(msg) |
                LoadError::IOError(msg) => error!("{}", msg),
            }
            exit(1);
        }
    };

    let mut cpu = match CPU::new(&sim_config) {
        Ok(cpu) => cpu,
        Err(err) => {
            error!("{}", err);
            exit(1);
        }
    };
    cpu.load_program(program);

    let cycles = if opt.show_state {
        let mut cycles = 0;
        while !cpu.scheduler().is_finished() && cycles < opt.max_cycles {
            cpu.step();
            cycles += 1;
            print_state(&cpu);
        }
        cycles
    } else {
        cpu.run(opt.max_cycles)
    };

    let scheduler = cpu.scheduler();
    println!("Finished after {} cycles, PC = {}", cycles, scheduler.pc());

    println!("Registers:");
    print_registers(&cpu);

    println!("Cache:");
    for line in scheduler.cache_status() {
        println!("  {}", line);
    }

    let perf_counters = scheduler.perf_counters();
    println!("Issued={} Committed={} Stalls={} CacheHits={} CacheMisses={} AddressClashes={} BranchesTaken={} Flushed={}",
             perf_counters.issue_cnt,
             perf_counters.commit_cnt,
             perf_counters.issue_stall_cnt,
             perf_counters.cache_hit_cnt,
             perf_counters.cache_miss_cnt,
             perf_counters.address_clash_cnt,
             perf_counters.branch_taken_cnt,
             perf_counters.flushed_cnt);
}

fn print_state(cpu: &CPU) {
    let scheduler = cpu.scheduler();
    println!("=== Cycle {} ===", scheduler.cycle());
    for station in scheduler.stations() {
        println!("  {}", station);
    }
    for entry in scheduler.rob_entries() {
        println!("  {}", entry);
    }
    print_registers(cpu);
}

fn print_registers(cpu: &CPU) {
    for register in cpu.scheduler().registers() {
        if register.value != 0.0 || register.tag.is_some() {
            println!("  {}", register);
        }
    }
}
