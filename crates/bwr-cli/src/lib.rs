//! BWR CLI Library
//!
//! Command-line front end for the Bio Wrangler utilities.
//!
//! # Overview
//!
//! Every utility is an independent subcommand of the `bwr` binary:
//!
//! - **Annotation files**: gene lengths, gene BED, biotype tables, feature merging (`bwr gff ...`)
//! - **Intervals**: nearest neighbours and GC content (`bwr bed ...`)
//! - **Sequences**: deduplication and contig merging (`bwr fasta ...`)
//! - **Tables**: row collapsing and value replacement (`bwr table ...`)
//! - **Alignments**: BLAT to GTF, BLAST runs and best hits (`bwr blat`, `bwr blast`)
//! - **circRNA**: summary statistics and in-silico controls (`bwr circ ...`)
//! - **Expression**: correlation, grouping, tissue specificity, co-expression modules (`bwr expr ...`)
//! - **Sequencing runs**: mapping summaries, FASTQ merging and combining (`bwr mapping`, `bwr fastq`)
//! - **Downloads**: BLAST databases, Ensembl releases, linked files (`bwr fetch ...`)
//! - **Remote annotation**: GO terms, variants, orthologues, protein id lookup (`bwr annotate`, `bwr rest`)

pub mod commands;
pub mod config;
pub mod error;
pub mod progress;

// Re-export commonly used types
pub use config::{Config, Overrides};
pub use error::{CliError, Result};

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// BWR - Bio Wrangler utilities
#[derive(Parser, Debug)]
#[command(name = "bwr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Print the full command reference as markdown
    #[arg(long, hide = true)]
    pub markdown_help: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Concurrent downloads or requests
    #[arg(long, env = "BWR_CONCURRENCY", global = true)]
    pub concurrency: Option<usize>,

    /// Extra attempts for a failed download or request
    #[arg(long, env = "BWR_RETRIES", global = true)]
    pub retries: Option<u32>,

    /// Network timeout in seconds
    #[arg(long, env = "BWR_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// REST requests per second
    #[arg(long, env = "BWR_REQS_PER_SEC", global = true)]
    pub reqs_per_sec: Option<u32>,
}

impl Cli {
    /// Settings given on the command line or through `BWR_*` variables
    pub fn overrides(&self) -> Overrides {
        Overrides {
            concurrency: self.concurrency,
            retries: self.retries,
            timeout_secs: self.timeout_secs,
            reqs_per_sec: self.reqs_per_sec,
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// GTF/GFF annotation tools
    Gff {
        #[command(subcommand)]
        command: GffCommand,
    },

    /// BED interval tools
    Bed {
        #[command(subcommand)]
        command: BedCommand,
    },

    /// FASTA tools
    Fasta {
        #[command(subcommand)]
        command: FastaCommand,
    },

    /// Tab-separated table tools
    Table {
        #[command(subcommand)]
        command: TableCommand,
    },

    /// BLAT alignment conversion
    Blat {
        #[command(subcommand)]
        command: BlatCommand,
    },

    /// circRNA analysis
    Circ {
        #[command(subcommand)]
        command: CircCommand,
    },

    /// Expression matrix analysis
    Expr {
        #[command(subcommand)]
        command: ExprCommand,
    },

    /// Aligner log summaries
    Mapping {
        #[command(subcommand)]
        command: MappingCommand,
    },

    /// Run BLAST+ and post-process its hits
    Blast {
        #[command(subcommand)]
        command: BlastCommand,
    },

    /// FASTQ file handling
    Fastq {
        #[command(subcommand)]
        command: FastqCommand,
    },

    /// UniProt flat files
    Uniprot {
        #[command(subcommand)]
        command: UniprotCommand,
    },

    /// Download public data sets
    Fetch {
        #[command(subcommand)]
        command: FetchCommand,
    },

    /// Annotate genes through remote services
    Annotate {
        #[command(subcommand)]
        command: AnnotateCommand,
    },

    /// Query the Ensembl REST API
    Rest {
        #[command(subcommand)]
        command: RestCommand,
    },
}

/// Unit that feature lines replace raw annotation by
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeUnit {
    /// Replace raw transcripts that have features
    Tr,
    /// Replace whole raw genes that have features
    Gene,
}

/// GTF/GFF subcommands
#[derive(Subcommand, Debug)]
pub enum GffCommand {
    /// Median transcript length per gene (headerless `gene\tlength`)
    GeneLength {
        /// Input GTF/GFF
        gtf: PathBuf,

        /// Output table
        output: PathBuf,
    },

    /// One BED6 line per gene spanning all of its features
    GeneBed {
        /// Input GTF/GFF
        gtf: PathBuf,

        /// Output BED
        output: PathBuf,

        /// Convert the 1-based annotation start to a 0-based BED start
        #[arg(long)]
        zero_based: bool,
    },

    /// Write gene_type.txt and transcript_type.txt biotype tables
    Biotypes {
        /// Input GTF/GFF
        gtf: PathBuf,

        /// Output directory
        out_dir: PathBuf,
    },

    /// Reference genes per biotype recovered by an assembly
    AssemblyCoverage {
        /// Reference GTF/GFF with gene lines
        gtf: PathBuf,

        /// Compare table with category_relative and ref_gene_id columns
        compare: PathBuf,

        /// Output table
        output: PathBuf,

        /// Species label written in the last column
        #[arg(short, long)]
        species: String,
    },

    /// Merge a feature GFF (e.g. TransDecoder) into a raw assembly GFF
    MergeFeature {
        /// Raw assembly GFF
        raw_gff: PathBuf,

        /// Feature GFF
        feature_gff: PathBuf,

        /// Output prefix; writes <prefix>.gff and <prefix>.gtf
        out_prefix: String,

        /// Replace raw lines by transcript or by gene
        #[arg(long, value_enum, default_value = "tr")]
        by: MergeUnit,

        /// Keep the assembler's gene and transcript ids
        #[arg(long)]
        no_rename: bool,

        /// Raw genes to drop when merging by gene (one id per line)
        #[arg(long)]
        rm_gene: Option<PathBuf>,

        /// Prefix of the assembler's ids
        #[arg(long, default_value = "MSTRG")]
        old_prefix: String,

        /// Prefix of the renamed ids
        #[arg(long, default_value = "Novel")]
        name_prefix: String,
    },

    /// Split chromosomes by BED intervals (`chrom start end split_name`)
    #[command(group(ArgGroup::new("split").required(true).multiple(true).args(["genome", "gtf"])))]
    SplitByBed {
        /// Split intervals
        bed: PathBuf,

        /// Genome FASTA; writes <genome>.splitChr.fa
        #[arg(long)]
        genome: Option<PathBuf>,

        /// Annotation; writes <gtf>.splitChr.<ext>
        #[arg(long)]
        gtf: Option<PathBuf>,
    },
}

/// Neighbour report level
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighbourLevel {
    Transcript,
    Gene,
}

/// BED subcommands
#[derive(Subcommand, Debug)]
pub enum BedCommand {
    /// Nearest upstream/downstream neighbour of another gene
    Nearest {
        /// Position-sorted transcript BED
        bed: PathBuf,

        /// Table with transcript_id, gene_id, transcript_biotype, gene_biotype
        tr_type: PathBuf,

        /// Output table
        output: PathBuf,

        /// Report per transcript or per gene
        #[arg(long, value_enum, default_value = "transcript")]
        level: NeighbourLevel,

        /// Only consider neighbours of this gene biotype
        #[arg(long)]
        neighbour_biotype: Option<String>,
    },

    /// GC count and fraction of every region, printed to stdout
    RegionGc {
        /// Genome FASTA
        genome: PathBuf,

        /// BED regions
        bed: PathBuf,
    },

    /// GC fraction per transcript feature, written to gc.content.txt
    FeatureGc {
        /// Genome FASTA
        genome: PathBuf,

        /// Feature BED (`chrom start end tr|id score strand gene_id feature`)
        bed: PathBuf,

        /// Output directory
        out_dir: PathBuf,
    },
}

/// FASTA subcommands
#[derive(Subcommand, Debug)]
pub enum FastaCommand {
    /// Keep the first sequence of every id
    Dedup {
        /// Input FASTA
        input: PathBuf,

        /// Output FASTA
        output: PathBuf,
    },

    /// Join small contigs into one super-contig
    MergeContigs {
        /// Genome FASTA
        genome: PathBuf,

        /// Contig ids to merge (one per line)
        contigs: PathBuf,

        /// Annotation to move onto the super-contig
        #[arg(long)]
        gtf: Option<PathBuf>,

        /// Ns between merged contigs
        #[arg(long, default_value_t = 100)]
        n_sep: usize,

        /// Super-contig name
        #[arg(long, default_value = "chrUn")]
        name: String,
    },
}

/// Table subcommands
#[derive(Subcommand, Debug)]
pub enum TableCommand {
    /// Condense rows sharing a key into one row
    Collapse {
        /// Input table (with header)
        input: PathBuf,

        /// Key column
        by: String,

        /// Output table
        output: PathBuf,

        /// Separator between joined values
        #[arg(long, default_value = ",")]
        sep: String,

        /// Written when a group has no values
        #[arg(long)]
        empty_rep: Option<String>,

        /// Placeholder value dropped before joining (e.g. --)
        #[arg(long)]
        ignore: Option<String>,
    },

    /// Replace the values of one column through a two-column mapping file
    Replace {
        /// Input table (with header)
        input: PathBuf,

        /// Column to rewrite
        column: String,

        /// Headerless `old\tnew` mapping
        mapping: PathBuf,

        /// Output table
        output: PathBuf,
    },
}

/// BLAT subcommands
#[derive(Subcommand, Debug)]
pub enum BlatCommand {
    /// Convert PSL hits to passed/failed GTF files for all and best hits
    ToGtf {
        /// BLAT PSL output
        psl: PathBuf,

        /// Output prefix (defaults to the PSL path without extension)
        #[arg(long)]
        prefix: Option<String>,

        /// Coverage cutoff (0-1)
        #[arg(long, default_value_t = 0.8)]
        cutoff: f64,
    },
}

/// circRNA subcommands
#[derive(Subcommand, Debug)]
pub enum CircCommand {
    /// Statistics and detail tables from CIRCexplorer known tables
    Summary {
        /// Directory holding the per-sample known tables
        circ_dir: PathBuf,

        /// Transcript table (transcript_id, transcript_biotype, gene_name)
        gene_type: PathBuf,

        /// Headerless `tissue\tsample` table
        tissue_sample: PathBuf,

        /// Mapping summary with Sample and total columns
        mapping_summary: PathBuf,

        /// Host gene expression matrix
        exp_table: PathBuf,

        /// Output directory
        out_dir: PathBuf,

        /// circRNA type: all_circ, circRNA or ciRNA
        #[arg(short = 't', long, default_value = "all_circ")]
        circ_type: String,

        /// Species (e.g. mus_musculus)
        #[arg(short, long)]
        species: String,

        /// Species abbreviation used in circRNA names
        #[arg(short, long)]
        abbr: String,

        /// Minimum junction reads
        #[arg(long, default_value_t = bwr_formats::circ::DEFAULT_READ_CUTOFF)]
        read_cutoff: u64,

        /// File name suffix of the known tables
        #[arg(long, default_value = bwr_formats::circ::KNOWN_TABLE_SUFFIX)]
        suffix: String,
    },

    /// Random exon back-splice controls from the hosts of real circRNAs
    InSilico {
        /// Annotation GTF
        gtf: PathBuf,

        /// Output table
        output: PathBuf,

        /// Real circRNA table (chrom, start, end, isoformName columns)
        #[arg(long)]
        real_circ_table: PathBuf,

        /// Random seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

/// Expression subcommands
#[derive(Subcommand, Debug)]
pub enum ExprCommand {
    /// Classify sample correlation pairs by tissue and replicate
    #[command(group(ArgGroup::new("source").required(true).args(["cor_table", "exp_table"])))]
    ClassifyCor {
        /// Headerless `sample\ttissue` table
        sample_tissue: PathBuf,

        /// Output directory; writes <gene-type>.cor.classify.txt
        out_dir: PathBuf,

        /// Gene type label
        #[arg(long)]
        gene_type: String,

        /// Precomputed sample correlation matrix
        #[arg(long)]
        cor_table: Option<PathBuf>,

        /// Expression matrix to correlate (Pearson)
        #[arg(long)]
        exp_table: Option<PathBuf>,
    },

    /// Aggregate samples into groups
    Group {
        /// Expression matrix
        matrix: PathBuf,

        /// Headerless `group\tsample` table
        groups: PathBuf,

        /// Output matrix
        output: PathBuf,

        /// Drop genes whose maximum is not above this (0: smallest non-zero value)
        #[arg(long, default_value_t = 0.0)]
        cutoff: f64,

        /// mean, min or max
        #[arg(long, default_value = "mean")]
        by: String,
    },

    /// Tissue specificity scores and per-biotype counts
    TissueSpecific {
        /// Expression matrix
        matrix: PathBuf,

        /// Headerless `tissue\tsample` table
        groups: PathBuf,

        /// Gene table with gene id first and a gene_biotype column
        gene_type: PathBuf,

        /// Output directory
        out_dir: PathBuf,

        /// Expression cutoff (0: smallest non-zero value)
        #[arg(long, default_value_t = 0.1)]
        cutoff: f64,
    },

    /// Keep genes expressed in more than a fraction of samples
    Filter {
        /// Expression matrix
        matrix: PathBuf,

        /// Output matrix
        output: PathBuf,

        /// Expression cutoff (0: smallest non-zero value)
        #[arg(long, default_value_t = 0.0)]
        exp_cutoff: f64,

        /// Fraction of samples a gene must be expressed in
        #[arg(long)]
        prop_cutoff: f64,
    },

    /// lncRNA-mRNA pair correlation against random backgrounds
    CoRegulation {
        /// Headerless `lncRNA\tmRNA\tdirection` pairs
        #[arg(short, long)]
        lnc_pc_pair: PathBuf,

        /// Headerless `mRNA\tmRNA\tdirection` pairs
        #[arg(short, long)]
        pc_pc_pair: PathBuf,

        /// lncRNA expression matrix
        #[arg(long)]
        lnc_exp: PathBuf,

        /// protein-coding expression matrix
        #[arg(long)]
        pc_exp: PathBuf,

        /// Output table
        #[arg(short, long, default_value = "co_reg_correlation.txt")]
        output: PathBuf,

        /// Random seed
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Print genes expressed above a cutoff in every sample
    Ubiquitous {
        /// Expression matrix
        matrix: PathBuf,

        /// Smallest value must be above this
        #[arg(default_value_t = 1.0)]
        cutoff: f64,
    },

    /// Filter a module correlation table and list the genes of each module
    CoexpModules {
        /// Table with module_name, mRNA, module_cor and diff columns
        cor_table: PathBuf,

        /// Output directory for gene lists and counts (default: next to the table)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,

        /// Minimum module correlation
        #[arg(long, default_value_t = 0.5)]
        cor_cut: f64,

        /// Minimum correlation difference
        #[arg(long, default_value_t = 0.3)]
        diff_cut: f64,
    },
}

/// Mapping summary subcommands
#[derive(Subcommand, Debug)]
pub enum MappingCommand {
    /// Summarise `samtools stats` reports (<dir>/<sample>/<sample>.<suffix>)
    Samtools {
        /// Mapping directory
        mapping_dir: PathBuf,

        /// Headerless sample table, sample id first
        sample_inf: PathBuf,

        /// Genome FASTA index (.fai)
        fai: PathBuf,

        /// Output table
        output: PathBuf,

        /// Stats file suffix
        #[arg(long, default_value = "realn.bam.stat")]
        suffix: String,
    },

    /// Summarise STAR logs (<dir>/<sample>/Log.final.out)
    Star {
        /// Mapping directory
        mapping_dir: PathBuf,

        /// Headerless sample table, sample id second
        sample_inf: PathBuf,

        /// Output table (defaults to <dir>/star_mapping.number.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// BLAST subcommands
#[derive(Subcommand, Debug)]
pub enum BlastCommand {
    /// Search input1 against input2 (FASTA or database prefix)
    Run {
        /// Query FASTA or database
        input1: PathBuf,

        /// Subject FASTA or database
        input2: PathBuf,

        /// Output directory
        outdir: PathBuf,

        /// Directory holding the BLAST+ executables
        #[arg(long)]
        blast_path: Option<PathBuf>,

        /// Expectation value threshold
        #[arg(long, default_value = "1e-5")]
        evalue: String,

        /// Alignment view option
        #[arg(long, default_value_t = 6)]
        outfmt: u32,

        /// Keep hits at or above this identity
        #[arg(long)]
        perc_identity: Option<u32>,

        /// Maximum aligned sequences to keep
        #[arg(long, default_value_t = 500)]
        max_target_seqs: u32,

        /// BLAST threads
        #[arg(long, default_value_t = 4)]
        num_threads: u32,

        /// Extra BLAST options, passed verbatim
        #[arg(long, allow_hyphen_values = true, num_args = 1..)]
        extra: Vec<String>,

        /// Search both directions and write reciprocal best hits
        #[arg(long)]
        bidirectional: bool,
    },

    /// Reciprocal pairs of two tabular BLAST results
    Bbh {
        /// Forward search hits
        forward: PathBuf,

        /// Reverse search hits
        reverse: PathBuf,

        /// Output table
        output: PathBuf,
    },
}

/// FASTQ subcommands
#[derive(Subcommand, Debug)]
pub enum FastqCommand {
    /// Merge FASTQ files of the same read name from several directories
    Merge {
        /// Directories to search
        #[arg(short = 'f', long = "fq-dir", required = true, num_args = 1..)]
        fq_dirs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Only write the plan to <out>/log.txt
        #[arg(long)]
        dry_run: bool,
    },

    /// Concatenate same-named files from several directories
    Combine {
        /// Directories, in concatenation order
        #[arg(short = 'f', long = "fq-dir", required = true, num_args = 1..)]
        fq_dirs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out_dir: PathBuf,

        /// Only files ending with this
        #[arg(long, default_value = "gz")]
        suffix: String,

        /// Copy files found in a single directory instead of linking them
        #[arg(long)]
        copy: bool,

        /// Only write the plan to <out>/log.txt
        #[arg(long)]
        dry_run: bool,
    },

    /// Rebuild raw ChIP-seq reads from clean, low quality and adapter parts
    MergeChip {
        /// Delivery directory holding the clean reads and 002/
        dir: PathBuf,

        /// Only write the plan to <dir>/rawdata/log.txt
        #[arg(long)]
        dry_run: bool,
    },
}

/// UniProt subcommands
#[derive(Subcommand, Debug)]
pub enum UniprotCommand {
    /// Description table (ids, cross references) of a flat file
    Describe {
        /// UniProt .dat file (optionally gzipped)
        dat: PathBuf,

        /// Output table
        output: PathBuf,
    },

    /// Cluster table from the headers of a UniRef FASTA file
    Uniref {
        /// UniRef FASTA (optionally gzipped)
        fasta: PathBuf,

        /// Output table
        output: PathBuf,
    },
}

/// Download subcommands
#[derive(Subcommand, Debug)]
pub enum FetchCommand {
    /// NCBI BLAST databases
    Blastdb {
        #[command(subcommand)]
        command: BlastdbCommand,
    },

    /// Ensembl Plants release files for a list of species
    Ensembl {
        /// Species names (e.g. "Oryza sativa" or oryza_sativa)
        #[arg(required = true, num_args = 1..)]
        species: Vec<String>,

        /// Ensembl Plants release
        #[arg(short, long)]
        release: u32,

        /// File kinds: cds, pep, gtf, dna-index
        #[arg(short, long, value_delimiter = ',', default_value = "cds,pep,gtf")]
        kinds: Vec<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Files linked from an HTML download table
    Scrape {
        /// Page URL
        url: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
}

/// BLAST database subcommands
#[derive(Subcommand, Debug)]
pub enum BlastdbCommand {
    /// List the databases on the NCBI server
    List {
        /// Database name pattern (regular expression)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Download every volume of a database
    Download {
        /// Database name pattern (regular expression)
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Skip MD5 verification
        #[arg(long)]
        no_md5: bool,

        /// Unpack the archives after download
        #[arg(long)]
        extract: bool,
    },
}

/// Remote annotation subcommands
#[derive(Subcommand, Debug)]
pub enum AnnotateCommand {
    /// UniProt and GO annotation for a GTF or a blasttab against UniProt
    Go {
        /// Input .gtf or .blasttab
        input: PathBuf,

        /// Species of a GTF input (e.g. oryza_sativa)
        #[arg(short, long)]
        species: Option<String>,

        /// EBI server
        #[arg(long, env = "BWR_EBI_SERVER", default_value = bwr_fetch::uniprot::EBI_SERVER, hide = true)]
        ebi_server: String,
    },
}

/// Ensembl REST subcommands
#[derive(Subcommand, Debug)]
pub enum RestCommand {
    /// Variants overlapping the gene of a symbol
    Variants {
        /// Species (e.g. human)
        species: String,

        /// Gene symbol
        symbol: String,

        /// REST server
        #[arg(long, env = "BWR_ENSEMBL_SERVER", default_value = bwr_fetch::ensembl::ENSEMBL_REST)]
        server: String,
    },

    /// Orthologues and their genomic sequences for an id map
    Orthologues {
        /// Headerless `protein_id\tensembl_id` map
        id_map: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Target taxon id
        #[arg(long, default_value_t = bwr_fetch::ensembl::DEFAULT_TARGET_TAXON)]
        taxon: u32,

        /// REST server
        #[arg(long, env = "BWR_ENSEMBL_SERVER", default_value = bwr_fetch::ensembl::ENSEMBL_GENOMES_REST)]
        server: String,
    },

    /// Resolve protein ids to Ensembl genes and download their genomic sequences
    ProteinSeq {
        /// File with one protein id per line
        id_list: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// Table of known ids: query id first, gene in an ensembl_id column
        #[arg(short = 'm', long)]
        name_map: Option<PathBuf>,

        /// Seconds to wait after each site search
        #[arg(long, default_value_t = 10)]
        pause: u64,

        /// REST server
        #[arg(long, env = "BWR_ENSEMBL_SERVER", default_value = bwr_fetch::ensembl::ENSEMBL_GENOMES_REST)]
        server: String,

        /// Ensembl Plants site used for the id search
        #[arg(long, env = "BWR_ENSEMBL_SITE", default_value = bwr_fetch::protein_seq::PLANTS_SITE, hide = true)]
        site: String,
    },
}
