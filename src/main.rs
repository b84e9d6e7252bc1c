#[macro_use]
extern crate clap;

use crossbeam::channel;
use log::{debug, error, info};
use powminer::block::Block;
use powminer::blockdb::BlockDatabase;
use powminer::config::{MinerConfig, BLOCK_REWARD, DEFAULT_MEMPOOL_SIZE, DEFAULT_MINING_STEPS};
use powminer::crypto::hash::H256;
use powminer::crypto::pow::{Keccak256, PowHasher, Sha256};
use powminer::crypto::sign::KeyPair;
use powminer::miner::memory_pool::MemoryPool;
use powminer::miner::worker;
use powminer::state::StateDatabase;
use powminer::transaction::Address;
use std::convert::TryInto;
use std::process;
use std::sync::{Arc, Mutex};

fn parse_address(encoded: &str) -> Address {
    let decoded = base64::decode(encoded.trim()).unwrap_or_else(|e| {
        error!("Error decoding address {}: {}", encoded, e);
        process::exit(1);
    });
    let raw: [u8; 32] = (&decoded[..]).try_into().unwrap_or_else(|_| {
        error!("Address {} is not 32 bytes long", encoded);
        process::exit(1);
    });
    raw.into()
}

fn main() {
    let default_steps = DEFAULT_MINING_STEPS.to_string();
    let default_reward = BLOCK_REWARD.to_string();
    let default_mempool = DEFAULT_MEMPOOL_SIZE.to_string();
    // parse command line arguments
    let matches = clap_app!(powminer =>
     (version: "0.1")
     (about: "Proof-of-work block miner")
     (@arg verbose: -v ... "Increases the verbosity of logging")
     (@arg difficulty: --difficulty [INT] "Sets the difficulty of the genesis block, in decimal")
     (@arg steps: --steps [INT] "Sets the number of nonces tried between checks for new work")
     (@arg blocks: --blocks [INT] default_value("1") "Sets the number of blocks to mine before exiting")
     (@arg block_reward: --("block-reward") [INT] "Sets the reward credited to the miner of a block")
     (@arg hash: --hash [NAME] default_value("keccak256") "Sets the proof-of-work hash function")
     (@arg coinbase: --coinbase [ADDR] "Sets the address credited with the rewards, a random one by default")
     (@arg init_fund_addr: --("fund-addr") ... [ADDR] "Endows the given address an initial fund in the genesis block")
     (@arg init_fund_value: --("fund-value") [INT] default_value("1000000") "Sets the initial fund of each address")
     (@arg mempool_size: --("mempool-size") [INT] "Sets the maximum number of transactions for the memory pool")
     (@subcommand keygen =>
      (about: "Generates a key pair")
      (@arg display_address: --addr "Prints the address of the key pair to STDERR")
     )
    )
    .get_matches();

    // match subcommands
    match matches.subcommand() {
        ("keygen", Some(m)) => {
            let keypair = KeyPair::generate();
            let base64_encoded = base64::encode(&keypair.to_bytes().to_vec());
            println!("{}", base64_encoded);
            if m.is_present("display_address") {
                let addr = keypair.address();
                eprintln!("{}", base64::encode(&addr));
            }
            return;
        }
        _ => {}
    }

    // init logger
    let verbosity = matches.occurrences_of("verbose") as usize;
    stderrlog::new().verbosity(verbosity).init().unwrap();

    // init config struct
    let difficulty = match matches.value_of("difficulty") {
        Some(d) => {
            let d = d.parse::<u64>().unwrap_or_else(|e| {
                error!("Error parsing difficulty: {}", e);
                process::exit(1);
            });
            if d == 0 {
                error!("Difficulty must be positive");
                process::exit(1);
            }
            H256::from(d)
        }
        None => *powminer::config::DEFAULT_DIFFICULTY,
    };
    let steps = matches
        .value_of("steps")
        .unwrap_or(&default_steps)
        .parse::<u64>()
        .unwrap_or_else(|e| {
            error!("Error parsing mining steps: {}", e);
            process::exit(1);
        });
    let block_reward = matches
        .value_of("block_reward")
        .unwrap_or(&default_reward)
        .parse::<u64>()
        .unwrap_or_else(|e| {
            error!("Error parsing block reward: {}", e);
            process::exit(1);
        });
    let num_blocks = matches
        .value_of("blocks")
        .unwrap()
        .parse::<u64>()
        .unwrap_or_else(|e| {
            error!("Error parsing number of blocks: {}", e);
            process::exit(1);
        });
    let config = MinerConfig::new(steps, block_reward);
    info!(
        "Mining {} blocks at difficulty {}, {} steps per round",
        num_blocks, difficulty, config.steps
    );

    let hasher: Arc<dyn PowHasher> = match matches.value_of("hash").unwrap() {
        "keccak256" => Arc::new(Keccak256),
        "sha256" => Arc::new(Sha256),
        other => {
            error!("Unknown hash function {}", other);
            process::exit(1);
        }
    };

    let coinbase = match matches.value_of("coinbase") {
        Some(addr) => parse_address(addr),
        None => KeyPair::generate().address(),
    };
    info!("Coinbase set to {}", coinbase);

    // init mempool
    let mempool_size = matches
        .value_of("mempool_size")
        .unwrap_or(&default_mempool)
        .parse::<usize>()
        .unwrap_or_else(|e| {
            error!("Error parsing memory pool size limit: {}", e);
            process::exit(1);
        });
    let mempool = Arc::new(Mutex::new(MemoryPool::new(mempool_size)));
    debug!("Initialized mempool, maximum size set to {}", mempool_size);

    // fund the given addresses
    let fund_value = matches
        .value_of("init_fund_value")
        .unwrap()
        .parse::<u64>()
        .unwrap_or_else(|e| {
            error!("Error parsing value of initial fund: {}", e);
            process::exit(1);
        });
    let allocations: Vec<(Address, u64)> = match matches.values_of("init_fund_addr") {
        Some(addrs) => addrs.map(|a| (parse_address(a), fund_value)).collect(),
        None => vec![],
    };
    for (addr, value) in allocations.iter() {
        info!("Endowing address {} with {}", addr, value);
    }

    // init state and block databases with the genesis block
    let state_db = Arc::new(StateDatabase::new());
    let genesis = Block::genesis(&state_db, difficulty, &allocations);
    let blockdb = Arc::new(BlockDatabase::new());
    let genesis_hash = blockdb.insert(&genesis);
    debug!("Initialized block database with genesis {}", genesis_hash);

    // start the miner
    let (block_sink, mined_blocks) = channel::unbounded();
    let (miner_ctx, miner) = worker::new(
        &blockdb,
        &mempool,
        &config,
        &hasher,
        coinbase,
        genesis_hash,
        block_sink,
    );
    miner_ctx.start();
    miner.start(config.steps);

    for _ in 0..num_blocks {
        match mined_blocks.recv() {
            Ok(block) => println!("{}", block.header),
            Err(e) => {
                error!("Miner stopped unexpectedly: {}", e);
                process::exit(1);
            }
        }
    }
    miner.exit();
    info!(
        "Mined {} blocks, {} blocks in the database",
        num_blocks,
        blockdb.num_blocks()
    );
}
