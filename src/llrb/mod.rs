pub mod llrb;
