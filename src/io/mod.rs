/// Reading FASTA protein databases
pub mod fasta;
